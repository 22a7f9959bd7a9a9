//! LanceDB Vector Store - 인덱스 벡터 데이터 저장
//!
//! 청크 임베딩을 LanceDB 테이블에 저장하고 코사인 거리로 검색합니다.
//! 소규모 코퍼스이므로 ANN 인덱스 없이 전수 검색(flat) 후
//! (거리, position) 순으로 다시 정렬하여 결과 순서를 결정적으로 만듭니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{sort_results, SearchResult, VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 기존 데이터를 지우고 새 저장소 생성
    pub async fn recreate(path: &Path) -> Result<Self> {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .with_context(|| format!("Failed to remove old vector data: {:?}", path))?;
        }
        Self::open(path).await
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("position", DataType::Int32, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;
        let dimension = first.embedding.len();

        if dimension == 0 {
            anyhow::bail!("Cannot store zero-dimension embeddings");
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch at position {}: expected {}, got {}",
                bad.position,
                dimension,
                bad.embedding.len()
            );
        }

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;
        let positions: Vec<i32> = entries.iter().map(|e| e.position).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(Int32Array::from(positions)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        // 동점 처리를 위해 전체를 가져온 뒤 직접 정렬/절단
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(total)
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        let mut results = Vec::with_capacity(total);

        for batch in batches {
            let positions = batch
                .column_by_name("position")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing position column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                results.push(SearchResult {
                    position: positions.value(i),
                    distance: distances.value(i),
                });
            }
        }

        sort_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn positions(&self) -> Result<Vec<i32>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .limit(total)
            .execute()
            .await
            .context("Failed to scan vector table")?
            .try_collect()
            .await?;

        let mut positions = Vec::with_capacity(total);
        for batch in batches {
            let column = batch
                .column_by_name("position")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing position column"))?;
            positions.extend(column.values().iter().copied());
        }

        positions.sort_unstable();
        Ok(positions)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        if !self.table_exists().await {
            return Ok(None);
        }

        let table = self.open_table().await?;
        let schema = table.schema().await.context("Failed to read table schema")?;
        let field = schema
            .field_with_name("embedding")
            .context("Missing embedding column")?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) => Ok(Some(*size as usize)),
            other => anyhow::bail!("Unexpected embedding column type: {:?}", other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
