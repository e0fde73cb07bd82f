//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! 프로세스 시작 시 한 번 읽어서 `Config`로 고정합니다.
//! 데이터 디렉토리 기본값: ~/.knowledge-rag/

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::knowledge::{StoreBackend, DEFAULT_EMBEDDING_DIMENSION};

// ============================================================================
// Defaults
// ============================================================================

/// 기본 LLM 모델 이름
pub const DEFAULT_MODEL: &str = "text-davinci-003";

/// 기본 결과 개수 (count 모드)
pub const DEFAULT_RESULT_LIMIT: usize = 5;

/// 기본 단어 예산 (words 모드)
pub const DEFAULT_WORD_BUDGET: usize = 512;

/// 시스템 프롬프트 기본 경로
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "./system_prompt.txt";

/// 작업 디렉토리의 환경 파일
pub const DOTENV_PATH: &str = ".env";

/// .env 파일 로드 (파일이 없으면 false)
///
/// 이미 설정된 환경변수는 덮어쓰지 않습니다.
pub fn load_dotenv(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to load {:?}", path)),
    }
}

/// 데이터 디렉토리 경로 (~/.knowledge-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".knowledge-rag")
}

// ============================================================================
// Config
// ============================================================================

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 데이터 디렉토리 (SQLite DB, Lance 테이블)
    pub data_dir: PathBuf,
    /// 문서 저장소 백엔드
    pub backend: StoreBackend,
    /// chat completions 엔드포인트
    pub llm_endpoint: String,
    /// embeddings 엔드포인트
    pub embedding_endpoint: String,
    /// Bearer API 키 (없으면 헤더 생략)
    pub api_key: Option<String>,
    /// 기본 완성 모델
    pub default_model: String,
    /// 기본 임베딩 모델
    pub embedding_model: String,
    /// 임베딩 차원
    pub embedding_dimension: usize,
    /// 단순 검색 기본 결과 수
    pub result_limit: usize,
    /// LLM 질의 기본 단어 예산
    pub word_budget: usize,
    /// 시스템 프롬프트 파일 경로
    pub system_prompt_path: PathBuf,
}

impl Config {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 로드
    ///
    /// 빈 문자열은 미설정으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_model = get("LLM_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_model = get("LLM_EMBEDDING_MODEL").unwrap_or_else(|| default_model.clone());

        let config = Self {
            data_dir: get("RAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(get_data_dir),
            backend: parse_or("RAG_STORE_BACKEND", get("RAG_STORE_BACKEND"), StoreBackend::Sqlite)?,
            llm_endpoint: get("LLM_ENDPOINT").unwrap_or_default(),
            embedding_endpoint: get("LLM_EMBEDDING_ENDPOINT").unwrap_or_default(),
            api_key: get("LLM_API_KEY"),
            default_model,
            embedding_model,
            embedding_dimension: parse_or(
                "EMBEDDING_DIMENSION",
                get("EMBEDDING_DIMENSION"),
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
            result_limit: parse_or("RAG_RESULT_LIMIT", get("RAG_RESULT_LIMIT"), DEFAULT_RESULT_LIMIT)?,
            word_budget: parse_or("RAG_WORD_BUDGET", get("RAG_WORD_BUDGET"), DEFAULT_WORD_BUDGET)?,
            system_prompt_path: get("SYSTEM_PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH)),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            anyhow::bail!("EMBEDDING_DIMENSION must be greater than zero");
        }
        if self.result_limit == 0 {
            anyhow::bail!("RAG_RESULT_LIMIT must be greater than zero");
        }
        if self.word_budget == 0 {
            anyhow::bail!("RAG_WORD_BUDGET must be greater than zero");
        }
        Ok(())
    }

    /// SQLite DB 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// Lance 테이블 디렉토리
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 시스템 프롬프트 로드 (파일이 없으면 None)
    pub fn load_system_prompt(&self) -> Result<Option<String>> {
        if !self.system_prompt_path.exists() {
            tracing::warn!(
                "System prompt not found at {:?}, completions will run without one",
                self.system_prompt_path
            );
            return Ok(None);
        }

        let prompt = std::fs::read_to_string(&self.system_prompt_path)
            .with_context(|| format!("Failed to read system prompt: {:?}", self.system_prompt_path))?;

        Ok(Some(prompt).filter(|p| !p.trim().is_empty()))
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, value, e)),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_load_dotenv() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!load_dotenv(&dir.path().join(".env")).unwrap());

        std::env::set_var("KNOWLEDGE_RAG_TEST_PRESET", "from-env");
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "KNOWLEDGE_RAG_TEST_DOTENV=from-file\nKNOWLEDGE_RAG_TEST_PRESET=from-file\n",
        )
        .unwrap();

        assert!(load_dotenv(&path).unwrap());
        assert_eq!(std::env::var("KNOWLEDGE_RAG_TEST_DOTENV").unwrap(), "from-file");
        assert_eq!(std::env::var("KNOWLEDGE_RAG_TEST_PRESET").unwrap(), "from-env");
    }

    #[test]
    fn test_load_dotenv_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NOT A VALID LINE\n").unwrap();
        assert!(load_dotenv(&path).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend, StoreBackend::Sqlite);
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.embedding_model, DEFAULT_MODEL);
        assert_eq!(config.embedding_dimension, DEFAULT_EMBEDDING_DIMENSION);
        assert_eq!(config.result_limit, 5);
        assert_eq!(config.word_budget, 512);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_embedding_model_falls_back_to_default_model() {
        let config = config_from(&[("LLM_DEFAULT_MODEL", "llama3")]).unwrap();
        assert_eq!(config.embedding_model, "llama3");

        let config = config_from(&[
            ("LLM_DEFAULT_MODEL", "llama3"),
            ("LLM_EMBEDDING_MODEL", "nomic-embed-text"),
        ])
        .unwrap();
        assert_eq!(config.embedding_model, "nomic-embed-text");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RAG_STORE_BACKEND", "lance"),
            ("RAG_DATA_DIR", "/tmp/rag"),
            ("EMBEDDING_DIMENSION", "1536"),
            ("RAG_WORD_BUDGET", "100"),
            ("LLM_API_KEY", "sk-test"),
        ])
        .unwrap();

        assert_eq!(config.backend, StoreBackend::Lance);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/rag/knowledge.db"));
        assert_eq!(config.embedding_dimension, 1536);
        assert_eq!(config.word_budget, 100);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("LLM_API_KEY", "  "), ("RAG_WORD_BUDGET", "")]).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.word_budget, DEFAULT_WORD_BUDGET);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("RAG_WORD_BUDGET", "lots")]).is_err());
        assert!(config_from(&[("RAG_WORD_BUDGET", "0")]).is_err());
        assert!(config_from(&[("RAG_STORE_BACKEND", "postgres")]).is_err());
    }

    #[test]
    fn test_missing_system_prompt_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config_from(&[]).unwrap();
        config.system_prompt_path = dir.path().join("missing.txt");
        assert!(config.load_system_prompt().unwrap().is_none());

        let path = dir.path().join("system_prompt.txt");
        std::fs::write(&path, "Cite sources.").unwrap();
        config.system_prompt_path = path;
        assert_eq!(config.load_system_prompt().unwrap().as_deref(), Some("Cite sources."));
    }
}
