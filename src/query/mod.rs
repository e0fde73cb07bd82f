//! Query 모듈 - 검색 → 프롬프트 → 완성 → 인용 해석
//!
//! ## 흐름
//! 1. 질의 임베딩 후 사용자/데이터셋 범위 검색 (`Retriever`)
//! 2. 후보 + 질의로 프롬프트 구성 (`compose`)
//! 3. 시스템 프롬프트와 함께 완성 요청
//! 4. `[citation]id[/citation]` 마커를 링크로 치환 (`resolve`)

mod citation;
mod planner;
mod prompt;

use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::knowledge::{Candidate, ChatSession, SearchBudget, SessionStore};
use crate::llm::CompletionProvider;

pub use citation::resolve;
pub use planner::Retriever;
pub use prompt::compose;

// ============================================================================
// Request / Response
// ============================================================================

/// 질의 요청
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    /// None이면 파이프라인 기본 예산
    pub budget: Option<SearchBudget>,
    /// None이면 "default"
    pub dataset: Option<String>,
    /// 완성/임베딩 모델 override
    pub model: Option<String>,
    /// 지정 시 질의/응답을 해당 세션에 추가
    pub session_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// 질의 응답
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// 인용 해석이 끝난 응답 텍스트
    pub response: String,
    /// 프롬프트에 들어간 후보 (순위 순서)
    pub citations: Vec<Candidate>,
    pub session_id: Option<String>,
}

// ============================================================================
// QueryPipeline
// ============================================================================

/// 기본 예산 설정
#[derive(Debug, Clone, Copy)]
pub struct QueryDefaults {
    /// 응답 생성 기본 예산
    pub answer_budget: SearchBudget,
    /// 단순 검색 기본 예산
    pub search_budget: SearchBudget,
}

/// 질의 파이프라인
#[derive(Clone)]
pub struct QueryPipeline {
    retriever: Retriever,
    completion: Arc<dyn CompletionProvider>,
    sessions: Arc<dyn SessionStore>,
    system_prompt: Option<String>,
    defaults: QueryDefaults,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        completion: Arc<dyn CompletionProvider>,
        sessions: Arc<dyn SessionStore>,
        system_prompt: Option<String>,
        defaults: QueryDefaults,
    ) -> Self {
        Self {
            retriever,
            completion,
            sessions,
            system_prompt,
            defaults,
        }
    }

    /// 검색 결과를 근거로 응답 생성
    pub async fn answer(&self, user_id: i64, request: QueryRequest) -> Result<QueryResponse> {
        if request.query.trim().is_empty() {
            return Err(RagError::invalid("query cannot be empty"));
        }

        let budget = request.budget.unwrap_or(self.defaults.answer_budget);
        let model = request.model.as_deref();

        // 소유권 확인은 검색/완성 전에
        let session = match request.session_id {
            Some(ref session_id) => Some(
                self.sessions
                    .get_session(session_id, user_id)
                    .await?
                    .unwrap_or_else(|| ChatSession::new(session_id.clone(), user_id)),
            ),
            None => None,
        };

        let candidates = self
            .retriever
            .retrieve(&request.query, request.dataset.as_deref(), user_id, budget, model)
            .await?;

        let prompt = compose(&candidates, &request.query);
        tracing::debug!(
            "Prompt built from {} candidates ({} chars)",
            candidates.len(),
            prompt.len()
        );

        let generated = self
            .completion
            .complete(&prompt, model, self.system_prompt.as_deref())
            .await
            .map_err(RagError::Provider)?;

        let response = resolve(&generated, &candidates).replace("\\n", "\n");

        if let Some(session) = session {
            self.append_turn(session, &request, &response).await?;
        }

        tracing::info!(
            "Answered query for user {} with {} citations",
            user_id,
            candidates.len()
        );

        Ok(QueryResponse {
            response,
            citations: candidates,
            session_id: request.session_id,
        })
    }

    /// 검색만 수행 (응답 생성 없음)
    pub async fn search(&self, user_id: i64, request: QueryRequest) -> Result<Vec<Candidate>> {
        let budget = request.budget.unwrap_or(self.defaults.search_budget);
        self.retriever
            .retrieve(
                &request.query,
                request.dataset.as_deref(),
                user_id,
                budget,
                request.model.as_deref(),
            )
            .await
    }

    async fn append_turn(
        &self,
        mut session: ChatSession,
        request: &QueryRequest,
        response: &str,
    ) -> Result<()> {
        session.push_turn(&request.query, response);
        if request.model.is_some() {
            session.model = request.model.clone();
        }
        self.sessions.save_session(&session).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{DocumentStore, NewDocument, SqliteStore};
    use crate::llm::fake::{FixedEmbedding, ScriptedCompletion};

    const DEFAULTS: QueryDefaults = QueryDefaults {
        answer_budget: SearchBudget::Words(512),
        search_budget: SearchBudget::Count(5),
    };

    struct Harness {
        store: Arc<SqliteStore>,
        completion: Arc<ScriptedCompletion>,
        pipeline: QueryPipeline,
    }

    fn harness(embedder: FixedEmbedding, completion: ScriptedCompletion) -> Harness {
        let store = Arc::new(SqliteStore::open_in_memory(2).unwrap());
        let completion = Arc::new(completion);
        let retriever = Retriever::new(Arc::new(embedder), store.clone());
        let pipeline = QueryPipeline::new(
            retriever,
            completion.clone(),
            store.clone(),
            Some("Answer with citations.".to_string()),
            DEFAULTS,
        );
        Harness {
            store,
            completion,
            pipeline,
        }
    }

    async fn add(store: &SqliteStore, dataset: &str, user_id: i64, title: &str, v: [f32; 2]) -> i64 {
        let ds = store.get_or_create_dataset(dataset, user_id).await.unwrap();
        store
            .add_document(NewDocument {
                dataset_id: ds.id,
                title: title.to_string(),
                url: Some(format!("https://docs/{}", title)),
                body: format!("{} body", title),
                vector: v.to_vec(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_answer_resolves_citations() {
        let store = Arc::new(SqliteStore::open_in_memory(2).unwrap());
        let id = add(&store, "default", 1, "Borrowing", [1.0, 0.0]).await;

        let reply = format!("See [citation]{}[/citation]\\nthanks", id);
        let pipeline = QueryPipeline::new(
            Retriever::new(
                Arc::new(FixedEmbedding::new(2).rule("borrow", vec![1.0, 0.0])),
                store.clone(),
            ),
            Arc::new(ScriptedCompletion::replying(&reply)),
            store.clone(),
            None,
            DEFAULTS,
        );

        let result = pipeline
            .answer(1, QueryRequest::new("how does borrow checking work?"))
            .await
            .unwrap();

        assert_eq!(result.response, "See [Borrowing](https://docs/Borrowing)\nthanks");
        assert_eq!(result.citations.len(), 1);
        assert!(result.session_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_dataset_prompts_no_results() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("I don't know"));

        let result = h
            .pipeline
            .answer(1, QueryRequest::new("anything there?"))
            .await
            .unwrap();

        assert!(result.citations.is_empty());
        let prompt = h.completion.last_prompt().unwrap();
        assert!(prompt.contains("No results"));
        assert!(prompt.ends_with("anything there?"));

        let prompts = h.completion.prompts.lock().unwrap();
        assert_eq!(prompts[0].2.as_deref(), Some("Answer with citations."));
    }

    #[tokio::test]
    async fn test_users_never_see_each_other() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("ok"));
        add(&h.store, "notes", 1, "alice-note", [1.0, 1.0]).await;
        add(&h.store, "notes", 2, "bob-note", [0.0, 0.0]).await;

        let request = QueryRequest {
            dataset: Some("notes".to_string()),
            ..QueryRequest::new("notes please")
        };
        let result = h.pipeline.answer(1, request).await.unwrap();

        let titles: Vec<&str> = result
            .citations
            .iter()
            .map(|c| c.document.title.as_str())
            .collect();
        assert_eq!(titles, vec!["alice-note"]);
        assert!(!h.completion.last_prompt().unwrap().contains("bob-note"));
    }

    #[tokio::test]
    async fn test_answer_appends_to_session() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("first answer"));

        let request = QueryRequest {
            session_id: Some("sess-1".to_string()),
            model: Some("llama3".to_string()),
            ..QueryRequest::new("first question")
        };
        let result = h.pipeline.answer(1, request).await.unwrap();
        assert_eq!(result.session_id.as_deref(), Some("sess-1"));

        let prompts = h.completion.prompts.lock().unwrap();
        assert_eq!(prompts[0].1.as_deref(), Some("llama3"));
        drop(prompts);

        let session = h.store.get_session("sess-1", 1).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "first question");
        assert_eq!(session.messages[1].content, "first answer");
        assert_eq!(session.model.as_deref(), Some("llama3"));
    }

    #[tokio::test]
    async fn test_foreign_session_rejected_before_completion() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("answer"));
        h.store
            .save_session(&ChatSession::new("owned", 1))
            .await
            .unwrap();

        let request = QueryRequest {
            session_id: Some("owned".to_string()),
            ..QueryRequest::new("question")
        };
        let err = h.pipeline.answer(2, request).await.unwrap_err();

        assert!(err.is_client_error());
        assert!(h.completion.last_prompt().is_none());
    }

    #[tokio::test]
    async fn test_completion_failure_is_provider_error() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::failing());

        let request = QueryRequest {
            session_id: Some("sess-2".to_string()),
            ..QueryRequest::new("question")
        };
        let err = h.pipeline.answer(1, request).await.unwrap_err();
        assert!(matches!(err, RagError::Provider(_)));
        assert!(h.store.get_session("sess-2", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_uses_count_default() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("unused"));
        for i in 0..7 {
            add(&h.store, "default", 1, &format!("doc{}", i), [i as f32, 0.0]).await;
        }

        let results = h.pipeline.search(1, QueryRequest::new("docs")).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].document.title, "doc0");
        assert!(h.completion.last_prompt().is_none());

        let request = QueryRequest {
            budget: Some(SearchBudget::Count(2)),
            ..QueryRequest::new("docs")
        };
        assert_eq!(h.pipeline.search(1, request).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let h = harness(FixedEmbedding::new(2), ScriptedCompletion::replying("unused"));
        let err = h.pipeline.answer(1, QueryRequest::new("")).await.unwrap_err();
        assert!(err.is_client_error());
        assert!(h.pipeline.search(1, QueryRequest::new(" ")).await.is_err());
    }
}
