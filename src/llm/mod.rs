//! LLM 모듈 - 임베딩 / 완성 프로바이더 인터페이스
//!
//! 파이프라인은 이 트레이트에만 의존합니다.
//! 재시도는 하지 않습니다 (전송 계층 책임).

mod openai;

use anyhow::Result;
use async_trait::async_trait;

pub use openai::OpenAiClient;

// ============================================================================
// Provider Traits
// ============================================================================

/// 임베딩 프로바이더
///
/// 텍스트를 고정 길이 벡터로 변환합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    ///
    /// `model`이 None이면 기본 임베딩 모델을 사용합니다.
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 완성 프로바이더
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트 완성
    ///
    /// # Arguments
    /// * `prompt` - 사용자 메시지
    /// * `model` - 모델 override (None이면 기본 모델)
    /// * `system` - 시스템 프롬프트
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        system: Option<&str>,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// Test Doubles
// ============================================================================
