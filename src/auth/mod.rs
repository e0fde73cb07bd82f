//! 인증 모듈 - 액세스 토큰 → 사용자 ID
//!
//! 유효 토큰 목록은 첫 사용 시 한 번 로드되어 모든 요청이 공유합니다.
//! 갱신은 `invalidate()` 호출 또는 프로세스 재시작으로만 일어납니다.
//! 동시 첫 호출은 중복 로드할 수 있지만 결과는 같습니다.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 저장된 액세스 토큰 (평문 대신 SHA-256 해시)
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expiration: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration > now
    }
}

/// 토큰 저장소
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// 저장된 전체 토큰
    async fn access_tokens(&self) -> Result<Vec<AccessToken>>;

    /// 토큰 저장
    async fn insert_access_token(&self, token: AccessToken) -> Result<()>;
}

/// 토큰 해시 (SHA-256, base64)
pub fn hash_token(token: &str) -> String {
    STANDARD.encode(Sha256::digest(token.as_bytes()))
}

/// 새 랜덤 토큰 생성
pub fn generate_token() -> String {
    format!(
        "kr_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

// ============================================================================
// AccessTokenAuthorizer
// ============================================================================

/// 토큰 캐시를 가진 인증기
pub struct AccessTokenAuthorizer {
    source: Arc<dyn TokenSource>,
    cache: RwLock<Option<Arc<Vec<AccessToken>>>>,
}

impl AccessTokenAuthorizer {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// 토큰 확인 (유효하면 사용자 ID)
    pub async fn check_token(&self, token: &str) -> Result<Option<i64>> {
        if token.trim().is_empty() {
            return Ok(None);
        }

        let tokens = self.tokens().await?;
        let hash = hash_token(token.trim());
        let now = Utc::now();

        Ok(tokens
            .iter()
            .find(|t| t.token_hash == hash && t.is_valid_at(now))
            .map(|t| t.user_id))
    }

    /// 토큰 확인, 실패 시 `Unauthorized`
    pub async fn authorize(&self, token: &str) -> Result<i64> {
        match self.check_token(token).await? {
            Some(user_id) => Ok(user_id),
            None => {
                tracing::warn!("Rejected access token");
                Err(RagError::Unauthorized)
            }
        }
    }

    /// 새 토큰 발급 (평문은 이때 한 번만 반환)
    pub async fn issue_token(&self, user_id: i64, ttl: Duration) -> Result<String> {
        if ttl <= Duration::zero() {
            return Err(RagError::invalid("token lifetime must be positive"));
        }

        let token = generate_token();
        self.source
            .insert_access_token(AccessToken {
                user_id,
                token_hash: hash_token(&token),
                expiration: Utc::now() + ttl,
            })
            .await?;

        self.invalidate().await;
        tracing::info!("Issued access token for user {}", user_id);
        Ok(token)
    }

    /// 캐시 비우기 (다음 확인 시 다시 로드)
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn tokens(&self) -> Result<Arc<Vec<AccessToken>>> {
        if let Some(tokens) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(tokens));
        }

        let fetched = Arc::new(self.source.access_tokens().await?);
        tracing::debug!("Loaded {} access tokens", fetched.len());

        let mut cache = self.cache.write().await;
        Ok(Arc::clone(cache.get_or_insert(fetched)))
    }
}

// ============================================================================
// Tests
// ============================================================================
