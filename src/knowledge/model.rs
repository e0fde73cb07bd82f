//! 데이터 모델 - 문서, 데이터셋, 검색 후보, 채팅 세션

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 데이터셋 이름 기본값
pub const DEFAULT_DATASET: &str = "default";

// ============================================================================
// Documents
// ============================================================================

/// 저장된 문서
///
/// 임베딩 벡터는 저장 시에만 전달되고 조회 결과에는 포함되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub dataset_id: i64,
    /// 데이터셋 소유자
    pub user_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 입력 (임베딩 완료 상태)
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub dataset_id: i64,
    pub title: String,
    pub url: Option<String>,
    pub body: String,
    pub vector: Vec<f32>,
}

/// 데이터셋 - (name, user_id) 쌍이 실제 식별자
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// 검색 후보 (질의 벡터 기준 순위 포함)
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document: Document,
    /// 1부터 시작
    pub rank: usize,
    /// 질의 벡터와의 백엔드 고유 거리 (SQLite: L2, Lance: `_distance`), 저장되지 않음
    ///
    /// 같은 백엔드 안에서만 비교할 수 있습니다.
    pub distance: f32,
}

impl Candidate {
    pub fn id(&self) -> i64 {
        self.document.id
    }
}

// ============================================================================
// Chat Sessions
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// 프롬프트 렌더링용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 채팅 세션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: i64,
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
}

impl ChatSession {
    /// 빈 세션 생성
    pub fn new(id: impl Into<String>, user_id: i64) -> Self {
        Self {
            id: id.into(),
            user_id,
            messages: Vec::new(),
            model: None,
        }
    }

    /// 한 턴 (사용자 + 어시스턴트) 추가
    pub fn push_turn(&mut self, query: &str, response: &str) {
        self.messages.push(ChatMessage::user(query));
        self.messages.push(ChatMessage::assistant(response));
    }
}
