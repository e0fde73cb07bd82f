//! knowledge-rag - 사용자/데이터셋 범위 RAG 백엔드
//!
//! 질의를 임베딩해 사용자 소유 데이터셋에서 가까운 문서를 찾고,
//! 검색 결과로 프롬프트를 구성해 LLM 응답을 생성한 뒤
//! `[citation]id[/citation]` 마커를 문서 링크로 바꿉니다.
//!
//! 문서 저장소는 SQLite 단독 또는 SQLite + LanceDB 중 시작 시 선택합니다.

pub mod app;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod query;

// Re-exports
pub use app::App;
pub use auth::{AccessToken, AccessTokenAuthorizer, TokenSource};
pub use chat::{ChatRequest, ChatResponse, ChatService};
pub use config::{get_data_dir, Config};
pub use error::{RagError, Result};
pub use ingest::{AddDocumentRequest, Ingestor};
pub use knowledge::{
    Candidate, ChatSession, Dataset, Document, DocumentStore, LanceStore, NewDocument,
    SearchBudget, SessionStore, SqliteStore, StoreBackend,
};
pub use llm::{CompletionProvider, EmbeddingProvider, OpenAiClient};
pub use query::{QueryPipeline, QueryRequest, QueryResponse, Retriever};
