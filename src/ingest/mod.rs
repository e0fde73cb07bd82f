//! Ingest 모듈 - 문서 수집 (검증 → 임베딩 → 데이터셋 → 저장)
//!
//! 임베딩이 실패하면 아무것도 쓰지 않습니다.
//! 일괄 수집은 첫 실패에서 멈추고, 이미 저장된 문서는 그대로 둡니다.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::error::{RagError, Result};
use crate::knowledge::{Document, DocumentStore, NewDocument, DEFAULT_DATASET};
use crate::llm::EmbeddingProvider;

/// 문서 추가 요청 (일괄 수집 시 JSON 배열 원소)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddDocumentRequest {
    pub title: String,
    pub url: Option<String>,
    pub body: String,
    /// None이면 "default"
    pub dataset: Option<String>,
}

/// 문서 수집기
#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    embedding_model: Option<String>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            embedder,
            store,
            embedding_model: None,
        }
    }

    /// 임베딩 모델 override
    pub fn with_embedding_model(mut self, model: Option<String>) -> Self {
        self.embedding_model = model;
        self
    }

    /// 단일 문서 추가
    pub async fn add_document(&self, user_id: i64, request: AddDocumentRequest) -> Result<Document> {
        let request = validate(request)?;

        let vector = self
            .embedder
            .embed(&request.body, self.embedding_model.as_deref())
            .await
            .map_err(RagError::Provider)?;

        let dataset_name = request
            .dataset
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DATASET);
        let dataset = self.store.get_or_create_dataset(dataset_name, user_id).await?;

        let document = self
            .store
            .add_document(NewDocument {
                dataset_id: dataset.id,
                title: request.title,
                url: request.url,
                body: request.body,
                vector,
            })
            .await?;

        tracing::info!(
            "Added document {} '{}' to dataset '{}' (user {})",
            document.id,
            document.title,
            dataset.name,
            user_id
        );
        Ok(document)
    }

    /// 일괄 추가 (순서대로, 첫 실패에서 중단)
    pub async fn add_documents(
        &self,
        user_id: i64,
        requests: Vec<AddDocumentRequest>,
    ) -> Result<Vec<Document>> {
        let total = requests.len();
        let mut added = Vec::with_capacity(total);

        for (i, request) in requests.into_iter().enumerate() {
            match self.add_document(user_id, request).await {
                Ok(doc) => added.push(doc),
                Err(e) => {
                    tracing::warn!(
                        "Bulk ingest stopped at {}/{} ({} already stored): {}",
                        i + 1,
                        total,
                        added.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(added)
    }
}

/// 제목/본문/URL 검증 및 정규화
fn validate(mut request: AddDocumentRequest) -> Result<AddDocumentRequest> {
    request.title = request.title.trim().to_string();
    if request.title.is_empty() {
        return Err(RagError::invalid("title cannot be empty"));
    }
    if request.body.trim().is_empty() {
        return Err(RagError::invalid("body cannot be empty"));
    }

    // 검증만 하고 입력한 URL 그대로 저장
    request.url = match request.url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            Url::parse(raw)
                .map_err(|e| RagError::invalid(format!("invalid URL '{}': {}", raw, e)))?;
            Some(raw.to_string())
        }
    };

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{SearchBudget, SqliteStore};
    use crate::llm::fake::FixedEmbedding;

    fn request(title: &str, url: Option<&str>, body: &str) -> AddDocumentRequest {
        AddDocumentRequest {
            title: title.to_string(),
            url: url.map(str::to_string),
            body: body.to_string(),
            dataset: None,
        }
    }

    fn ingestor(embedder: FixedEmbedding) -> (Arc<SqliteStore>, Ingestor) {
        let store = Arc::new(SqliteStore::open_in_memory(2).unwrap());
        let ingestor = Ingestor::new(Arc::new(embedder), store.clone());
        (store, ingestor)
    }

    #[tokio::test]
    async fn test_add_document_into_default_dataset() {
        let (store, ingestor) = ingestor(FixedEmbedding::new(2).rule("lifetimes", vec![1.0, 0.0]));

        let doc = ingestor
            .add_document(7, request(" Lifetimes ", Some(" https://doc.rust-lang.org "), "lifetimes explained"))
            .await
            .unwrap();

        assert_eq!(doc.title, "Lifetimes");
        assert_eq!(doc.user_id, 7);
        assert_eq!(doc.url.as_deref(), Some("https://doc.rust-lang.org"));

        let found = store
            .search(&[1.0, 0.0], "default", 7, SearchBudget::Count(5))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), doc.id);
    }

    #[tokio::test]
    async fn test_url_stored_as_given() {
        let (_, ingestor) = ingestor(FixedEmbedding::new(2));

        let doc = ingestor
            .add_document(1, request("t", Some("HTTPS://Example.COM/a/../b?q=1"), "body"))
            .await
            .unwrap();
        assert_eq!(doc.url.as_deref(), Some("HTTPS://Example.COM/a/../b?q=1"));

        let doc = ingestor
            .add_document(1, request("u", Some("   "), "body"))
            .await
            .unwrap();
        assert!(doc.url.is_none());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (_, ingestor) = ingestor(FixedEmbedding::new(2));

        for bad in [
            request("", None, "body"),
            request("title", None, "   "),
            request("title", Some("not a url"), "body"),
            request("title", Some("/relative/path"), "body"),
        ] {
            let err = ingestor.add_document(1, bad).await.unwrap_err();
            assert!(err.is_client_error(), "{}", err);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let (store, ingestor) = ingestor(FixedEmbedding::new(2).failing());

        let err = ingestor
            .add_document(1, request("t", None, "body"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Provider(_)));
        assert!(store.find_dataset("default", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let (_, ingestor) = ingestor(FixedEmbedding::new(2).rule("wide", vec![1.0, 2.0, 3.0]));
        let err = ingestor
            .add_document(1, request("t", None, "wide vector"))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_bulk_fails_fast_without_rollback() {
        let (store, ingestor) = ingestor(FixedEmbedding::new(2));

        let mut requests = vec![
            request("one", None, "first"),
            request("", None, "broken"),
            request("three", None, "never stored"),
        ];
        requests[0].dataset = Some("bulk".to_string());
        requests[2].dataset = Some("bulk".to_string());

        assert!(ingestor.add_documents(1, requests).await.is_err());

        let stored = store
            .search(&[0.0, 0.0], "bulk", 1, SearchBudget::Count(10))
            .await
            .unwrap();
        let titles: Vec<&str> = stored.iter().map(|c| c.document.title.as_str()).collect();
        assert_eq!(titles, vec!["one"]);
    }

    #[test]
    fn test_request_from_json() {
        let requests: Vec<AddDocumentRequest> = serde_json::from_str(
            r#"[{"title":"a","body":"x"},{"title":"b","body":"y","url":"https://b","dataset":"notes"}]"#,
        )
        .unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.is_none());
        assert_eq!(requests[1].dataset.as_deref(), Some("notes"));
    }

    #[tokio::test]
    async fn test_embedding_model_override() {
        let embedder = Arc::new(FixedEmbedding::new(2));
        let store = Arc::new(SqliteStore::open_in_memory(2).unwrap());
        let ingestor = Ingestor::new(embedder.clone(), store)
            .with_embedding_model(Some("nomic-embed".to_string()));

        ingestor.add_document(1, request("t", None, "b")).await.unwrap();
        assert_eq!(
            embedder.calls.lock().unwrap()[0].1.as_deref(),
            Some("nomic-embed")
        );
    }
}
