//! Chat 모듈 - 세션 기반 대화 (검색 없음)
//!
//! 세션 기록을 `User: ...` / `AI: ...` 줄로 렌더링하고 마지막에 `AI:`를 붙입니다.
//! 완성이 성공한 턴만 저장됩니다.
//! 설정된 시스템 프롬프트가 있으면 함께 전송됩니다.

use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::knowledge::{ChatMessage, ChatSession, Role, SessionStore};
use crate::llm::CompletionProvider;

/// 채팅 요청
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub query: String,
    /// None이면 새 세션 ID 생성
    pub session_id: Option<String>,
    pub model: Option<String>,
}

/// 채팅 응답
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
}

/// 채팅 서비스
#[derive(Clone)]
pub struct ChatService {
    completion: Arc<dyn CompletionProvider>,
    sessions: Arc<dyn SessionStore>,
    system_prompt: Option<String>,
}

impl ChatService {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        sessions: Arc<dyn SessionStore>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            completion,
            sessions,
            system_prompt,
        }
    }

    /// 한 턴 진행
    pub async fn chat(&self, user_id: i64, request: ChatRequest) -> Result<ChatResponse> {
        if request.query.trim().is_empty() {
            return Err(RagError::invalid("query cannot be empty"));
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut session = match self.sessions.get_session(&session_id, user_id).await? {
            Some(session) => session,
            None => {
                tracing::debug!("Starting new chat session {}", session_id);
                ChatSession::new(session_id.clone(), user_id)
            }
        };

        let model = request.model.or_else(|| session.model.clone());
        let prompt = render_prompt(&session.messages, &request.query);

        let response = self
            .completion
            .complete(&prompt, model.as_deref(), self.system_prompt.as_deref())
            .await
            .map_err(RagError::Provider)?;

        session.push_turn(&request.query, &response);
        session.model = model;
        self.sessions.save_session(&session).await?;

        tracing::info!(
            "Chat turn saved for session {} ({} messages)",
            session.id,
            session.messages.len()
        );

        Ok(ChatResponse {
            session_id: session.id,
            response,
        })
    }
}

/// 대화 기록 + 새 질의 → 프롬프트
fn render_prompt(history: &[ChatMessage], query: &str) -> String {
    let mut prompt = String::new();
    for message in history {
        prompt.push_str(message.role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str(Role::User.label());
    prompt.push_str(": ");
    prompt.push_str(query);
    prompt.push('\n');
    prompt.push_str(Role::Assistant.label());
    prompt.push(':');
    prompt
}
