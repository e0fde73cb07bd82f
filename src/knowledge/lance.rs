//! LanceDB 저장소 - 문서 행은 SQLite, 벡터 검색은 LanceDB
//!
//! 벡터 테이블에는 (doc_id, dataset_id, embedding)만 저장하고, 검색은
//! dataset_id 필터를 건 L2 최근접 검색입니다. 결과 문서는 SQLite에서
//! 같은 데이터셋 범위로 다시 읽습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};

use super::budget::{apply_budget, rank_by_distance, validate_query_vector, SearchBudget};
use super::model::{Candidate, Dataset, Document, NewDocument};
use super::sqlite::{validate_document_vector, SqliteStore, SEARCH_TIMEOUT, WRITE_TIMEOUT};
use super::store::{DocumentStore, StoreBackend};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "document_vectors";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스
pub struct LanceVectorIndex {
    db: Connection,
    dimension: i32,
    /// 테이블 생성 경쟁 방지
    write_lock: Mutex<()>,
}

impl LanceVectorIndex {
    /// LanceDB 인덱스 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> AnyResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let dimension = i32::try_from(dimension)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding dimension: {}", dimension))?;

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            dimension,
            write_lock: Mutex::new(()),
        })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("doc_id", DataType::Int64, false),
            Field::new("dataset_id", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    fn to_batch(&self, doc_id: i64, dataset_id: i64, vector: &[f32]) -> AnyResult<RecordBatch> {
        let values = Float32Array::from(vector.to_vec());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(Int64Array::from(vec![doc_id])),
                Arc::new(Int64Array::from(vec![dataset_id])),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> AnyResult<bool> {
        has_table(self.db.table_names().execute().await)
    }

    async fn open_table(&self) -> AnyResult<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }

    /// 벡터 하나 추가 (테이블이 없으면 생성)
    pub async fn insert(&self, doc_id: i64, dataset_id: i64, vector: &[f32]) -> AnyResult<()> {
        let batch = self.to_batch(doc_id, dataset_id, vector)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.write_lock.lock().await;

        if self.table_exists().await? {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vector to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create vector table")?;
        }

        Ok(())
    }

    /// 데이터셋 범위 최근접 검색 -> (doc_id, distance), 거리 오름차순
    ///
    /// `limit`이 None이면 데이터셋 전체 행 수를 사용합니다.
    pub async fn search(
        &self,
        query: &[f32],
        dataset_id: i64,
        limit: Option<usize>,
    ) -> AnyResult<Vec<(i64, f32)>> {
        if !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        // dataset_id는 i64 타입으로 검증됨 - SQL 인젝션 방지
        let filter = format!("dataset_id = {}", dataset_id);

        let limit = match limit {
            Some(n) => n,
            None => table
                .count_rows(Some(filter.clone()))
                .await
                .context("Failed to count dataset vectors")?,
        };
        if limit == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = table
            .vector_search(query.to_vec())
            .context("Failed to create vector search")?
            .only_if(filter)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await
            .context("Failed to read vector search results")?;

        let mut hits = Vec::new();
        for batch in batches {
            let doc_ids = batch
                .column_by_name("doc_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing doc_id column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                hits.push((doc_ids.value(i), distances.value(i)));
            }
        }

        Ok(hits)
    }

    /// 벡터 개수
    pub async fn count(&self) -> AnyResult<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

// ============================================================================
// LanceStore
// ============================================================================

/// SQLite + LanceDB 문서 저장소
pub struct LanceStore {
    meta: Arc<SqliteStore>,
    index: LanceVectorIndex,
}

impl LanceStore {
    /// # Arguments
    /// * `meta` - 문서 행/데이터셋을 보관하는 SQLite 저장소
    /// * `lance_path` - .lance 디렉토리 경로
    pub async fn open(meta: Arc<SqliteStore>, lance_path: &Path) -> AnyResult<Self> {
        let index = LanceVectorIndex::open(lance_path, meta.dimension()).await?;
        Ok(Self { meta, index })
    }

    pub fn index(&self) -> &LanceVectorIndex {
        &self.index
    }
}

/// 테이블 목록 조회 결과 → 벡터 테이블 존재 여부 (조회 실패는 에러)
fn has_table<E>(names: std::result::Result<Vec<String>, E>) -> AnyResult<bool>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let names = names.context("Failed to list LanceDB tables")?;
    Ok(names.iter().any(|n| n == TABLE_NAME))
}

/// 타임아웃 적용 후 anyhow 에러를 저장소 에러로 변환
async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = AnyResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Err(_) => Err(RagError::Timeout {
            operation,
            after: timeout,
        }),
        Ok(result) => result.map_err(|e| RagError::Store(e.context(operation))),
    }
}

#[async_trait]
impl DocumentStore for LanceStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Lance
    }

    fn dimension(&self) -> usize {
        self.meta.dimension()
    }

    async fn get_or_create_dataset(&self, name: &str, user_id: i64) -> Result<Dataset> {
        self.meta.get_or_create_dataset(name, user_id).await
    }

    async fn add_document(&self, doc: NewDocument) -> Result<Document> {
        validate_document_vector(&doc.vector, self.dimension())?;

        let vector = doc.vector.clone();
        let stored = self.meta.insert_document_row(doc).await?;

        bounded(
            "insert_vector",
            WRITE_TIMEOUT,
            self.index.insert(stored.id, stored.dataset_id, &vector),
        )
        .await?;

        Ok(stored)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        dataset: &str,
        user_id: i64,
        budget: SearchBudget,
    ) -> Result<Vec<Candidate>> {
        validate_query_vector(query_vector, self.dimension())?;
        budget.validate()?;

        let Some(ds) = self.meta.find_dataset(dataset, user_id).await? else {
            tracing::debug!("Dataset '{}' not found for user {}", dataset, user_id);
            return Ok(vec![]);
        };

        let hits = bounded(
            "vector_search",
            SEARCH_TIMEOUT,
            self.index.search(query_vector, ds.id, budget.candidate_limit()),
        )
        .await?;

        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let mut docs = self.meta.documents_by_ids(ds.id, ids).await?;

        let scored = hits
            .into_iter()
            .map(|(id, distance)| {
                docs.remove(&id).map(|doc| (doc, distance)).ok_or_else(|| {
                    RagError::Store(anyhow::anyhow!("Vector for missing document {}", id))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(apply_budget(rank_by_distance(scored), budget))
    }
}

// ============================================================================
// Tests
// ============================================================================
