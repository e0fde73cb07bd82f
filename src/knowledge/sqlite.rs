//! SQLite 저장소 - rusqlite 기반 문서/데이터셋/세션/토큰 저장
//!
//! 저장 위치: ~/.knowledge-rag/knowledge.db
//!
//! 벡터는 little-endian f32 BLOB으로 저장하고, 검색은 데이터셋 범위를
//! 전부 읽어 L2 거리를 정확히 계산합니다. 누적 단어 예산은 순위가 정해진
//! 결과 위에서 클라이언트 측에서 계산합니다.
//!
//! 모든 호출은 blocking 풀에서 실행되며 타임아웃으로 감쌉니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use crate::auth::{AccessToken, TokenSource};
use crate::error::{RagError, Result};

use super::budget::{apply_budget, rank_by_distance, validate_query_vector, SearchBudget};
use super::model::{Candidate, ChatMessage, ChatSession, Dataset, Document, NewDocument};
use super::store::{DocumentStore, SessionStore, StoreBackend};
use super::vector::{decode_vector, encode_vector, euclidean_distance};

/// 쓰기 타임아웃
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// 검색 타임아웃
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

const DOCUMENT_COLUMNS: &str =
    "d.id, d.dataset_id, s.user_id, d.title, d.url, d.body, d.created_at";

// ============================================================================
// Types
// ============================================================================

/// FTS5 키워드 검색 결과
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub document: Document,
    /// BM25 스코어 (낮을수록 관련도 높음)
    pub bm25_score: f64,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub dataset_count: usize,
    pub session_count: usize,
    pub total_body_bytes: usize,
    pub db_path: Option<PathBuf>,
}

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite 문서 저장소
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
    dimension: usize,
    fts_enabled: bool,
}

impl SqliteStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로
    /// * `dimension` - 임베딩 차원
    pub fn open(path: &Path, dimension: usize) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        Self::from_connection(conn, Some(path.to_path_buf()), dimension)
    }

    /// 메모리 DB (테스트/임시용)
    pub fn open_in_memory(dimension: usize) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, None, dimension)
    }

    fn from_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        dimension: usize,
    ) -> anyhow::Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than zero");
        }

        let fts_enabled = initialize(&conn)?;
        tracing::debug!("SQLite store initialized at {:?} (fts5={})", db_path, fts_enabled);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            dimension,
            fts_enabled,
        })
    }

    /// DB 경로 (메모리 DB는 None)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// blocking 풀에서 연결을 잠그고 실행, 타임아웃 적용
    ///
    /// 클로저가 `RagError`를 반환하면 그대로 전달하고, 그 외는 저장소 에러로 감쌉니다.
    pub(crate) async fn call<T, F>(
        &self,
        operation: &'static str,
        timeout: Duration,
        f: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
            f(&conn)
        });

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(RagError::Timeout {
                operation,
                after: timeout,
            }),
            Ok(Err(join_err)) => Err(RagError::Store(anyhow::anyhow!(
                "{} task failed: {}",
                operation,
                join_err
            ))),
            Ok(Ok(result)) => result.map_err(|e| match e.downcast::<RagError>() {
                Ok(rag) => rag,
                Err(e) => RagError::Store(e.context(operation)),
            }),
        }
    }

    /// 데이터셋 조회 (생성하지 않음)
    pub async fn find_dataset(&self, name: &str, user_id: i64) -> Result<Option<Dataset>> {
        let name = name.to_string();
        self.call("find_dataset", SEARCH_TIMEOUT, move |conn| {
            find_dataset(conn, &name, user_id)
        })
        .await
    }

    /// ID 목록으로 문서 조회 (데이터셋 범위 내)
    pub(crate) async fn documents_by_ids(
        &self,
        dataset_id: i64,
        ids: Vec<i64>,
    ) -> Result<HashMap<i64, Document>> {
        self.call("documents_by_ids", SEARCH_TIMEOUT, move |conn| {
            documents_by_ids(conn, dataset_id, &ids)
        })
        .await
    }

    /// 벡터 없이 문서 행만 저장 (벡터는 외부 인덱스가 보관)
    pub(crate) async fn insert_document_row(&self, doc: NewDocument) -> Result<Document> {
        self.call("insert_document", WRITE_TIMEOUT, move |conn| {
            insert_document(conn, &doc, None)
        })
        .await
    }

    /// FTS5 키워드 검색 (데이터셋/사용자 범위)
    ///
    /// BM25 알고리즘으로 스코어링된 결과를 반환합니다.
    /// source: https://www.sqlite.org/fts5.html#the_bm25_function
    pub async fn keyword_search(
        &self,
        query: &str,
        dataset: &str,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        if limit == 0 {
            return Err(RagError::invalid("limit must be greater than zero"));
        }
        if !self.fts_enabled {
            return Err(RagError::Store(anyhow::anyhow!("FTS5 is not available")));
        }

        let escaped = escape_fts5_query(query);
        if escaped.is_empty() {
            return Ok(vec![]);
        }

        let dataset = dataset.to_string();
        self.call("keyword_search", SEARCH_TIMEOUT, move |conn| {
            let sql = format!(
                "SELECT {}, bm25(documents_fts)
                 FROM documents_fts
                 JOIN documents d ON d.id = documents_fts.rowid
                 JOIN datasets s ON s.id = d.dataset_id
                 WHERE documents_fts MATCH ?1 AND s.name = ?2 AND s.user_id = ?3
                 ORDER BY bm25(documents_fts), d.id
                 LIMIT ?4",
                DOCUMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params![escaped, dataset, user_id, limit as i64], |row| {
                    Ok(KeywordHit {
                        document: row_to_document(row)?,
                        bm25_score: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read keyword search results")?;
            Ok(hits)
        })
        .await
    }

    /// 저장소 통계
    pub async fn stats(&self) -> Result<StoreStats> {
        let db_path = self.db_path.clone();
        self.call("stats", SEARCH_TIMEOUT, move |conn| {
            let count = |sql: &str| -> anyhow::Result<usize> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as usize)
            };

            Ok(StoreStats {
                document_count: count("SELECT COUNT(*) FROM documents")?,
                dataset_count: count("SELECT COUNT(*) FROM datasets")?,
                session_count: count("SELECT COUNT(*) FROM sessions")?,
                total_body_bytes: count("SELECT COALESCE(SUM(LENGTH(body)), 0) FROM documents")?,
                db_path,
            })
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Sqlite
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn get_or_create_dataset(&self, name: &str, user_id: i64) -> Result<Dataset> {
        let name = validate_dataset_name(name)?;
        self.call("get_or_create_dataset", WRITE_TIMEOUT, move |conn| {
            get_or_create_dataset(conn, &name, user_id)
        })
        .await
    }

    async fn add_document(&self, doc: NewDocument) -> Result<Document> {
        validate_document_vector(&doc.vector, self.dimension)?;
        self.call("add_document", WRITE_TIMEOUT, move |conn| {
            insert_document(conn, &doc, Some(&doc.vector))
        })
        .await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        dataset: &str,
        user_id: i64,
        budget: SearchBudget,
    ) -> Result<Vec<Candidate>> {
        validate_query_vector(query_vector, self.dimension)?;
        budget.validate()?;

        let query = query_vector.to_vec();
        let dataset = dataset.to_string();

        self.call("search", SEARCH_TIMEOUT, move |conn| {
            let Some(ds) = find_dataset(conn, &dataset, user_id)? else {
                tracing::debug!("Dataset '{}' not found for user {}", dataset, user_id);
                return Ok(vec![]);
            };

            let scored = scoped_vectors(conn, ds.id)?
                .into_iter()
                .map(|(doc, vector)| {
                    let distance = euclidean_distance(&query, &vector);
                    (doc, distance)
                })
                .collect();

            let candidates = apply_budget(rank_by_distance(scored), budget);
            tracing::debug!(
                "Search in dataset {} ({}) returned {} candidates",
                ds.id,
                budget,
                candidates.len()
            );
            Ok(candidates)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_session(&self, id: &str, user_id: i64) -> Result<Option<ChatSession>> {
        if id.trim().is_empty() {
            return Err(RagError::invalid("session ID cannot be empty"));
        }

        let id = id.to_string();
        self.call("get_session", WRITE_TIMEOUT, move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, messages, model FROM sessions WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, owner, messages, model)) = row else {
                return Ok(None);
            };

            if owner != user_id {
                return Err(RagError::invalid(format!("session {} belongs to another user", id)).into());
            }

            let messages: Vec<ChatMessage> =
                serde_json::from_str(&messages).context("Failed to decode session messages")?;

            Ok(Some(ChatSession {
                id,
                user_id: owner,
                messages,
                model,
            }))
        })
        .await
    }

    async fn save_session(&self, session: &ChatSession) -> Result<()> {
        if session.id.trim().is_empty() {
            return Err(RagError::invalid("session ID cannot be empty"));
        }

        let messages = serde_json::to_string(&session.messages)
            .map_err(|e| RagError::Store(anyhow::anyhow!("Failed to encode session: {}", e)))?;
        let session = session.clone();

        self.call("save_session", WRITE_TIMEOUT, move |conn| {
            let changed = conn.execute(
                "INSERT INTO sessions (id, user_id, messages, model, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     messages = excluded.messages,
                     model = excluded.model,
                     updated_at = excluded.updated_at
                 WHERE sessions.user_id = excluded.user_id",
                params![
                    session.id,
                    session.user_id,
                    messages,
                    session.model,
                    Utc::now().to_rfc3339()
                ],
            )?;

            if changed == 0 {
                return Err(RagError::invalid(format!(
                    "session {} belongs to another user",
                    session.id
                ))
                .into());
            }

            tracing::debug!(
                "Saved session {} ({} messages)",
                session.id,
                session.messages.len()
            );
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TokenSource for SqliteStore {
    async fn access_tokens(&self) -> Result<Vec<AccessToken>> {
        self.call("access_tokens", SEARCH_TIMEOUT, |conn| {
            let mut stmt =
                conn.prepare("SELECT user_id, token_hash, expiration FROM access_tokens")?;
            let tokens = stmt
                .query_map([], |row| {
                    Ok(AccessToken {
                        user_id: row.get(0)?,
                        token_hash: row.get(1)?,
                        expiration: parse_datetime(row.get::<_, String>(2)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tokens)
        })
        .await
    }

    async fn insert_access_token(&self, token: AccessToken) -> Result<()> {
        self.call("insert_access_token", WRITE_TIMEOUT, move |conn| {
            conn.execute(
                "INSERT INTO access_tokens (token_hash, user_id, expiration) VALUES (?1, ?2, ?3)",
                params![token.token_hash, token.user_id, token.expiration.to_rfc3339()],
            )
            .context("Failed to insert access token")?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// Schema
// ============================================================================

/// 스키마 초기화 (FTS5 사용 가능 여부 반환)
fn initialize(conn: &Connection) -> anyhow::Result<bool> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(name, user_id)
        );

        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL REFERENCES datasets(id),
            title TEXT NOT NULL,
            url TEXT,
            body TEXT NOT NULL,
            vector BLOB,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_dataset ON documents(dataset_id);

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            messages TEXT NOT NULL,
            model TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS access_tokens (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expiration TEXT NOT NULL
        );
        "#,
    )
    .context("Failed to create tables")?;

    // FTS5 가상 테이블 (키워드 검색용)
    // source: https://www.sqlite.org/fts5.html
    let fts_result = conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
            title,
            body,
            content=documents,
            content_rowid=id
        )",
        [],
    );

    if let Err(e) = fts_result {
        tracing::warn!("FTS5 not available (optional): {}", e);
        return Ok(false);
    }

    conn.execute_batch(
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, title, body)
            VALUES (new.id, new.title, new.body);
        END;

        CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, title, body)
            VALUES('delete', old.id, old.title, old.body);
        END;
        "#,
    )
    .context("Failed to create FTS5 triggers")?;

    Ok(true)
}

// ============================================================================
// Statements
// ============================================================================

fn find_dataset(conn: &Connection, name: &str, user_id: i64) -> anyhow::Result<Option<Dataset>> {
    let dataset = conn
        .query_row(
            "SELECT id, name, user_id, created_at FROM datasets WHERE name = ?1 AND user_id = ?2",
            params![name, user_id],
            row_to_dataset,
        )
        .optional()
        .context("Failed to look up dataset")?;
    Ok(dataset)
}

fn get_or_create_dataset(conn: &Connection, name: &str, user_id: i64) -> anyhow::Result<Dataset> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO datasets (name, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![name, user_id, Utc::now().to_rfc3339()],
        )
        .context("Failed to create dataset")?;

    if inserted > 0 {
        tracing::info!("Created dataset '{}' for user {}", name, user_id);
    }

    find_dataset(conn, name, user_id)?
        .ok_or_else(|| anyhow::anyhow!("Dataset '{}' vanished after insert", name))
}

fn insert_document(
    conn: &Connection,
    doc: &NewDocument,
    vector: Option<&[f32]>,
) -> anyhow::Result<Document> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM datasets WHERE id = ?1",
            params![doc.dataset_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(user_id) = owner else {
        return Err(RagError::invalid(format!("dataset {} does not exist", doc.dataset_id)).into());
    };

    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO documents (dataset_id, title, url, body, vector, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doc.dataset_id,
            doc.title,
            doc.url,
            doc.body,
            vector.map(encode_vector),
            created_at.to_rfc3339()
        ],
    )
    .context("Failed to insert document")?;

    let id = conn.last_insert_rowid();
    tracing::info!("Added document: {} (id={}, dataset={})", doc.title, id, doc.dataset_id);

    Ok(Document {
        id,
        dataset_id: doc.dataset_id,
        user_id,
        title: doc.title.clone(),
        url: doc.url.clone(),
        body: doc.body.clone(),
        created_at,
    })
}

/// 데이터셋의 모든 (문서, 벡터) - 행 하나라도 실패하면 전체 실패
fn scoped_vectors(conn: &Connection, dataset_id: i64) -> anyhow::Result<Vec<(Document, Vec<f32>)>> {
    let sql = format!(
        "SELECT {}, d.vector
         FROM documents d
         JOIN datasets s ON s.id = d.dataset_id
         WHERE d.dataset_id = ?1 AND d.vector IS NOT NULL
         ORDER BY d.id",
        DOCUMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![dataset_id], |row| {
            Ok((row_to_document(row)?, row.get::<_, Vec<u8>>(7)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to scan documents")?;

    rows.into_iter()
        .map(|(doc, blob)| Ok((doc, decode_vector(&blob)?)))
        .collect()
}

fn documents_by_ids(
    conn: &Connection,
    dataset_id: i64,
    ids: &[i64],
) -> anyhow::Result<HashMap<i64, Document>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {}
         FROM documents d
         JOIN datasets s ON s.id = d.dataset_id
         WHERE d.dataset_id = ? AND d.id IN ({})",
        DOCUMENT_COLUMNS, placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let params = std::iter::once(dataset_id).chain(ids.iter().copied());
    let docs = stmt
        .query_map(params_from_iter(params), row_to_document)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to load documents")?;

    Ok(docs.into_iter().map(|d| (d.id, d)).collect())
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn validate_dataset_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RagError::invalid("dataset name cannot be empty"));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_document_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::invalid("vector cannot be empty"));
    }
    if vector.len() != dimension {
        return Err(RagError::invalid(format!(
            "vector has {} dimensions, expected {}",
            vector.len(),
            dimension
        )));
    }
    Ok(())
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        body: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn row_to_dataset(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// FTS5 쿼리 이스케이프
///
/// 단어마다 큰따옴표로 감싸 연산자 해석을 막습니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory(DIM).unwrap()
    }

    async fn add(store: &SqliteStore, dataset: &Dataset, title: &str, body: &str, v: [f32; 3]) -> Document {
        store
            .add_document(NewDocument {
                dataset_id: dataset.id,
                title: title.to_string(),
                url: Some(format!("https://example.com/{}", title)),
                body: body.to_string(),
                vector: v.to_vec(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_dataset_is_idempotent() {
        let store = create_test_store();

        let a = store.get_or_create_dataset("notes", 1).await.unwrap();
        let b = store.get_or_create_dataset("notes", 1).await.unwrap();
        let other_user = store.get_or_create_dataset("notes", 2).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, other_user.id);
        assert_eq!(other_user.user_id, 2);
        assert!(store.get_or_create_dataset("  ", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_add_document_rejects_bad_vectors() {
        let store = create_test_store();
        let ds = store.get_or_create_dataset("default", 1).await.unwrap();

        let mut doc = NewDocument {
            dataset_id: ds.id,
            title: "t".to_string(),
            url: None,
            body: "b".to_string(),
            vector: vec![],
        };
        let err = store.add_document(doc.clone()).await.unwrap_err();
        assert!(err.is_client_error());

        doc.vector = vec![1.0, 2.0];
        let err = store.add_document(doc.clone()).await.unwrap_err();
        assert!(err.is_client_error());

        doc.vector = vec![1.0, 2.0, 3.0];
        doc.dataset_id = 999;
        let err = store.add_document(doc).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance() {
        let store = create_test_store();
        let ds = store.get_or_create_dataset("default", 1).await.unwrap();

        let far = add(&store, &ds, "far", "far away", [10.0, 0.0, 0.0]).await;
        let near = add(&store, &ds, "near", "very close", [1.0, 0.0, 0.0]).await;
        let mid = add(&store, &ds, "mid", "in between", [4.0, 0.0, 0.0]).await;

        let results = store
            .search(&[0.0, 0.0, 0.0], "default", 1, SearchBudget::Count(5))
            .await
            .unwrap();

        let ids: Vec<i64> = results.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![near.id, mid.id, far.id]);
        assert_eq!(results[0].rank, 1);
        assert!((results[0].distance - 1.0).abs() < 1e-6);
        assert_eq!(results[0].document.url.as_deref(), Some("https://example.com/near"));
    }

    #[tokio::test]
    async fn test_search_word_budget() {
        let store = create_test_store();
        let ds = store.get_or_create_dataset("default", 1).await.unwrap();

        let d1 = add(&store, &ds, "d1", &vec!["w"; 50].join(" "), [1.0, 0.0, 0.0]).await;
        add(&store, &ds, "d2", &vec!["w"; 80].join(" "), [2.0, 0.0, 0.0]).await;

        let results = store
            .search(&[0.0, 0.0, 0.0], "default", 1, SearchBudget::Words(100))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), d1.id);
    }

    #[tokio::test]
    async fn test_search_is_scoped_by_user() {
        let store = create_test_store();
        let a = store.get_or_create_dataset("notes", 1).await.unwrap();
        let b = store.get_or_create_dataset("notes", 2).await.unwrap();

        let doc_a = add(&store, &a, "a", "alpha", [1.0, 1.0, 1.0]).await;
        add(&store, &b, "b", "beta", [0.0, 0.0, 0.0]).await;

        let results = store
            .search(&[0.0, 0.0, 0.0], "notes", 1, SearchBudget::Count(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), doc_a.id);
        assert_eq!(results[0].document.user_id, 1);
    }

    #[tokio::test]
    async fn test_search_unknown_dataset_is_empty() {
        let store = create_test_store();
        let results = store
            .search(&[0.0, 0.0, 0.0], "default", 1, SearchBudget::Count(5))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_validation() {
        let store = create_test_store();

        assert!(store
            .search(&[], "default", 1, SearchBudget::Count(5))
            .await
            .unwrap_err()
            .is_client_error());
        assert!(store
            .search(&[0.0], "default", 1, SearchBudget::Count(5))
            .await
            .unwrap_err()
            .is_client_error());
        assert!(store
            .search(&[0.0, 0.0, 0.0], "default", 1, SearchBudget::Count(0))
            .await
            .unwrap_err()
            .is_client_error());
        assert!(store
            .search(&[0.0, 0.0, 0.0], "default", 1, SearchBudget::Words(0))
            .await
            .unwrap_err()
            .is_client_error());
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let store = create_test_store();
        let ds = store.get_or_create_dataset("default", 1).await.unwrap();
        let other = store.get_or_create_dataset("default", 2).await.unwrap();

        add(&store, &ds, "react", "React is a JavaScript library", [1.0, 0.0, 0.0]).await;
        add(&store, &ds, "vue", "Vue is a JavaScript framework", [0.0, 1.0, 0.0]).await;
        add(&store, &other, "angular", "Angular is a JavaScript framework", [0.0, 0.0, 1.0]).await;

        let hits = store.keyword_search("JavaScript", "default", 1, 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store.keyword_search("framework", "default", 1, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.title, "vue");

        assert!(store.keyword_search("::", "default", 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_round_trip_and_ownership() {
        let store = create_test_store();
        assert!(store.get_session("s1", 1).await.unwrap().is_none());

        let mut session = ChatSession::new("s1", 1);
        session.push_turn("hi", "hello");
        session.model = Some("llama3".to_string());
        store.save_session(&session).await.unwrap();

        session.push_turn("more", "ok");
        store.save_session(&session).await.unwrap();

        let loaded = store.get_session("s1", 1).await.unwrap().unwrap();
        assert_eq!(loaded, session);

        assert!(store.get_session("s1", 2).await.unwrap_err().is_client_error());
        let hijack = ChatSession::new("s1", 2);
        assert!(store.save_session(&hijack).await.unwrap_err().is_client_error());
        assert_eq!(store.get_session("s1", 1).await.unwrap().unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_access_tokens() {
        let store = create_test_store();
        let token = AccessToken {
            user_id: 5,
            token_hash: "hash".to_string(),
            expiration: Utc::now() + chrono::Duration::days(1),
        };
        store.insert_access_token(token.clone()).await.unwrap();

        let tokens = store.access_tokens().await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].user_id, 5);
        assert_eq!(tokens[0].token_hash, "hash");
    }

    #[tokio::test]
    async fn test_open_on_disk_and_stats() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        {
            let store = SqliteStore::open(&db_path, DIM).unwrap();
            let ds = store.get_or_create_dataset("default", 1).await.unwrap();
            add(&store, &ds, "t", "1234567890", [0.0, 0.0, 0.0]).await;
        }

        let store = SqliteStore::open(&db_path, DIM).unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.dataset_count, 1);
        assert_eq!(stats.total_body_bytes, 10);
        assert_eq!(store.db_path(), Some(db_path.as_path()));
    }

    #[test]
    fn test_escape_fts5_query() {
        assert_eq!(escape_fts5_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(escape_fts5_query("  "), "");
        assert_eq!(escape_fts5_query("hello:world"), "\"helloworld\"");
        assert_eq!(escape_fts5_query("test-query_123"), "\"test-query_123\"");
    }
}
