//! 검색 계획 - 질의 임베딩 후 범위 제한 검색

use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::knowledge::{Candidate, DocumentStore, SearchBudget, DEFAULT_DATASET};
use crate::llm::EmbeddingProvider;

/// 질의 텍스트 → 검색 후보
///
/// 상태가 없으므로 여러 요청에서 동시에 호출해도 됩니다.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// 질의 임베딩 + 검색
    ///
    /// # Arguments
    /// * `dataset` - None 또는 빈 문자열이면 "default"
    /// * `model` - 임베딩 모델 override
    pub async fn retrieve(
        &self,
        query: &str,
        dataset: Option<&str>,
        user_id: i64,
        budget: SearchBudget,
        model: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid("query cannot be empty"));
        }
        budget.validate()?;

        let dataset = dataset
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DATASET);

        let vector = self
            .embedder
            .embed(query, model)
            .await
            .map_err(RagError::Provider)?;

        tracing::debug!(
            "Retrieving from '{}' for user {} with {} via {}",
            dataset,
            user_id,
            budget,
            self.embedder.name()
        );

        self.store.search(&vector, dataset, user_id, budget).await
    }
}
