//! 에러 타입 - RAG 파이프라인 공통 에러 분류
//!
//! - 입력 검증 에러: 호출자 책임 (재시도 없음)
//! - 프로바이더 에러: 임베딩/완성 API 실패
//! - 저장소 에러: 쿼리/연결 실패, 타임아웃
//!
//! 인용 마커 미해결은 에러가 아닙니다 (원문 유지).

use std::time::Duration;

/// 라이브러리 공통 Result
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 에러
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// 잘못된 입력 (빈 쿼리, 빈 벡터, 0 이하의 limit 등)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 인증 실패
    #[error("unauthorized")]
    Unauthorized,

    /// 임베딩/완성 프로바이더 실패
    #[error("provider error: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// 저장소 실패
    #[error("store error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// 저장소 호출 타임아웃
    #[error("store operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl RagError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// 호출자 측 에러 여부 (HTTP 4xx 대응)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(RagError::invalid("empty query").is_client_error());
        assert!(RagError::Unauthorized.is_client_error());
        assert!(!RagError::Provider(anyhow::anyhow!("502")).is_client_error());
        assert!(!RagError::Store(anyhow::anyhow!("locked")).is_client_error());
        assert!(!RagError::Timeout {
            operation: "search",
            after: Duration::from_secs(10),
        }
        .is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = RagError::invalid("limit must be greater than zero");
        assert_eq!(err.to_string(), "invalid input: limit must be greater than zero");
    }
}
