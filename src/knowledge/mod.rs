//! Knowledge 모듈 - 사용자/데이터셋 범위 문서 저장소
//!
//! - SQLite: 문서/데이터셋/세션/토큰 저장 + 정확한 L2 스캔 + FTS5 키워드 검색
//! - LanceDB: 벡터 최근접 검색 (SQLite 문서 행과 결합)
//! - Budget: 결과 개수 / 누적 단어 수 예산

mod budget;
mod lance;
mod model;
mod sqlite;
mod store;
mod vector;

// Re-exports
pub use budget::{
    apply_budget, rank_by_distance, validate_query_vector, word_count, SearchBudget,
};
pub use lance::{LanceStore, LanceVectorIndex};
pub use model::{
    Candidate, ChatMessage, ChatSession, Dataset, Document, NewDocument, Role, DEFAULT_DATASET,
};
pub use sqlite::{KeywordHit, SqliteStore, StoreStats, SEARCH_TIMEOUT, WRITE_TIMEOUT};
pub use store::{DocumentStore, SessionStore, StoreBackend};
pub use vector::{decode_vector, encode_vector, euclidean_distance, DEFAULT_EMBEDDING_DIMENSION};
