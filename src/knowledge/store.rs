//! 저장소 트레이트 - 문서 저장소 / 세션 저장소 공통 인터페이스
//!
//! 질의 파이프라인은 이 트레이트에만 의존합니다.
//! 구현체는 시작 시 `StoreBackend`로 선택합니다.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::Result;

use super::budget::SearchBudget;
use super::model::{Candidate, ChatSession, Dataset, Document, NewDocument};

// ============================================================================
// Backend Selection
// ============================================================================

/// 문서 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite 단독 (벡터 BLOB + 정확한 L2 스캔)
    Sqlite,
    /// SQLite (문서/데이터셋) + LanceDB (벡터 검색)
    Lance,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "lance" | "lancedb" => Ok(StoreBackend::Lance),
            other => Err(format!("unknown store backend '{}' (expected sqlite or lance)", other)),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Lance => write!(f, "lance"),
        }
    }
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// 문서 저장소
///
/// 모든 조회/쓰기는 (데이터셋 이름, 사용자 ID) 범위로 제한됩니다.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 백엔드 종류
    fn backend(&self) -> StoreBackend;

    /// 저장 벡터 차원
    fn dimension(&self) -> usize;

    /// 데이터셋 조회, 없으면 생성 (수집 경로 전용)
    async fn get_or_create_dataset(&self, name: &str, user_id: i64) -> Result<Dataset>;

    /// 문서 저장
    ///
    /// 빈 벡터 또는 차원 불일치는 거부됩니다.
    async fn add_document(&self, doc: NewDocument) -> Result<Document>;

    /// 범위 제한 유사도 검색
    ///
    /// 거리 오름차순 (동률은 삽입 순서), 예산 적용 후 반환합니다.
    /// 존재하지 않는 데이터셋은 빈 결과입니다.
    async fn search(
        &self,
        query_vector: &[f32],
        dataset: &str,
        user_id: i64,
        budget: SearchBudget,
    ) -> Result<Vec<Candidate>>;
}

// ============================================================================
// SessionStore Trait
// ============================================================================

/// 채팅 세션 저장소
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 세션 조회 (없으면 None, 다른 사용자 소유면 에러)
    async fn get_session(&self, id: &str, user_id: i64) -> Result<Option<ChatSession>>;

    /// 세션 저장 (upsert)
    async fn save_session(&self, session: &ChatSession) -> Result<()>;
}
