//! Embedding Index - 청크 임베딩 인덱스 빌드/저장/로드/검색
//!
//! 디스크에는 두 개의 짝 파일로 저장됩니다:
//! - `chunks.lance/` : 벡터 데이터 (LanceDB)
//! - `chunks.meta.json` : 같은 순서의 청크 메타데이터 + 체크섬 매니페스트
//!
//! 매니페스트는 항상 마지막에 원자적으로 기록되므로, 빌드 도중 중단되면
//! 인덱스는 "없음" 상태로 남고 다음 시작 시 다시 빌드됩니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collector::DocumentLoader;
use crate::embedding::EmbeddingProvider;

use super::chunker::{Chunk, ChunkConfig, Chunker, WindowChunker};
use super::lance::LanceVectorStore;
use super::vector::{VectorEntry, VectorStore};

/// 매니페스트 포맷 버전
const INDEX_FORMAT_VERSION: u32 = 1;
/// 임베딩 요청 배치 크기
const EMBED_BATCH_SIZE: usize = 32;

const VECTORS_DIR: &str = "chunks.lance";
const METADATA_FILE: &str = "chunks.meta.json";

// ============================================================================
// Types
// ============================================================================

/// 인덱스 파일 경로
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub dir: PathBuf,
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            vectors: dir.join(VECTORS_DIR),
            metadata: dir.join(METADATA_FILE),
        }
    }
}

/// 인덱스에 저장된 청크 (소유형)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// 빌드 순서 (벡터 position과 동일)
    pub position: usize,
    /// 원본 문서 경로
    pub source: String,
    /// 문서 내 청크 순번
    pub chunk_index: usize,
    /// 문서 내 시작 위치 (문자)
    pub start_offset: usize,
    pub overlap_with_previous: usize,
    pub text: String,
}

impl ChunkRecord {
    fn from_chunk(position: usize, chunk: &Chunk<'_>) -> Self {
        Self {
            position,
            source: chunk.document.source(),
            chunk_index: chunk.index,
            start_offset: chunk.start_offset,
            overlap_with_previous: chunk.overlap_with_previous,
            text: chunk.text.clone(),
        }
    }
}

/// 거리 포함 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    /// 코사인 거리 (작을수록 유사)
    pub distance: f32,
}

/// 메타데이터 파일 내용
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexManifest {
    version: u32,
    embedding_model: String,
    dimension: usize,
    built_at: DateTime<Utc>,
    checksum: String,
    entries: Vec<ChunkRecord>,
}

impl IndexManifest {
    fn new(embedding_model: &str, dimension: usize, entries: Vec<ChunkRecord>) -> Result<Self> {
        let checksum = compute_checksum(embedding_model, dimension, &entries)?;
        Ok(Self {
            version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dimension,
            built_at: Utc::now(),
            checksum,
            entries,
        })
    }
}

fn compute_checksum(embedding_model: &str, dimension: usize, entries: &[ChunkRecord]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(embedding_model.as_bytes());
    hasher.update(dimension.to_le_bytes());
    hasher.update(serde_json::to_vec(entries).context("Failed to serialize index entries")?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// 인덱스 요약 정보
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub source_count: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub built_at: Option<DateTime<Utc>>,
    pub persisted: bool,
}

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// 임베딩 인덱스
///
/// 빌드 또는 로드 후에는 읽기 전용이며, 여러 요청에서 동시에 검색해도 안전합니다.
pub struct EmbeddingIndex {
    manifest: IndexManifest,
    store: Option<LanceVectorStore>,
    persisted: bool,
}

impl EmbeddingIndex {
    /// 저장되지 않는 빈 인덱스 (빌드 실패 시 폴백)
    pub fn empty(embedding_model: &str) -> Self {
        Self {
            manifest: IndexManifest {
                version: INDEX_FORMAT_VERSION,
                embedding_model: embedding_model.to_string(),
                dimension: 0,
                built_at: Utc::now(),
                checksum: String::new(),
                entries: vec![],
            },
            store: None,
            persisted: false,
        }
    }

    /// 청크를 임베딩하여 인덱스를 빌드하고 디스크에 저장 (기존 인덱스 덮어씀)
    pub async fn build(
        paths: &IndexPaths,
        chunks: &[Chunk<'_>],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .with_context(|| format!("Failed to create index directory: {:?}", paths.dir))?;

        // 매니페스트를 먼저 지워 중간 실패 시 "없음" 상태가 되도록 함
        if paths.metadata.exists() {
            tokio::fs::remove_file(&paths.metadata)
                .await
                .context("Failed to remove previous index metadata")?;
        }

        let entries: Vec<ChunkRecord> = chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| ChunkRecord::from_chunk(position, chunk))
            .collect();

        let mut vectors = Vec::with_capacity(entries.len());
        for (i, batch) in entries.chunks(EMBED_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                entries.len().div_ceil(EMBED_BATCH_SIZE)
            );
            let texts: Vec<String> = batch.iter().map(|e| e.text.clone()).collect();
            let embedded = embedder
                .embed_batch(&texts)
                .await
                .context("Failed to embed chunks")?;
            vectors.extend(embedded);
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dimension || v.is_empty()) {
            anyhow::bail!("Embedding provider returned inconsistent vector dimensions");
        }

        let store = if entries.is_empty() {
            if paths.vectors.exists() {
                tokio::fs::remove_dir_all(&paths.vectors)
                    .await
                    .context("Failed to remove previous vector data")?;
            }
            None
        } else {
            let store = LanceVectorStore::recreate(&paths.vectors).await?;
            let vector_entries = vectors
                .into_iter()
                .enumerate()
                .map(|(position, embedding)| -> Result<VectorEntry> {
                    Ok(VectorEntry {
                        position: i32::try_from(position).context("Too many chunks")?,
                        embedding,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            store
                .insert_batch(&vector_entries)
                .await
                .context("Failed to insert vectors")?;
            Some(store)
        };

        let manifest = IndexManifest::new(embedder.name(), dimension, entries)?;
        write_manifest(&paths.metadata, &manifest).await?;

        tracing::info!(
            "Built index: {} chunks, dimension {}, model {}",
            manifest.entries.len(),
            dimension,
            manifest.embedding_model
        );

        Ok(Self {
            manifest,
            store,
            persisted: true,
        })
    }

    /// 저장된 인덱스 로드
    ///
    /// 인덱스가 없거나, 손상되었거나, 다른 임베딩 모델로 빌드된 경우 `Ok(None)`을
    /// 반환합니다 (재빌드 필요). 호출자를 실패시키지 않습니다.
    pub async fn load(paths: &IndexPaths, embedding_model: &str) -> Result<Option<Self>> {
        if !paths.metadata.exists() {
            tracing::info!("No persisted index at {:?}", paths.dir);
            return Ok(None);
        }

        match Self::load_verified(paths, embedding_model).await {
            Ok(index) => Ok(Some(index)),
            Err(e) => {
                tracing::warn!("Persisted index is unusable, rebuild needed: {:#}", e);
                Ok(None)
            }
        }
    }

    async fn load_verified(paths: &IndexPaths, embedding_model: &str) -> Result<Self> {
        let bytes = tokio::fs::read(&paths.metadata)
            .await
            .context("Failed to read index metadata")?;
        let manifest: IndexManifest =
            serde_json::from_slice(&bytes).context("Failed to parse index metadata")?;

        if manifest.version != INDEX_FORMAT_VERSION {
            anyhow::bail!("Unsupported index format version {}", manifest.version);
        }

        let checksum = compute_checksum(
            &manifest.embedding_model,
            manifest.dimension,
            &manifest.entries,
        )?;
        if checksum != manifest.checksum {
            anyhow::bail!("Index metadata checksum mismatch");
        }

        if manifest.embedding_model != embedding_model {
            anyhow::bail!(
                "Index was built with {} but the current embedding model is {}",
                manifest.embedding_model,
                embedding_model
            );
        }

        if manifest
            .entries
            .iter()
            .enumerate()
            .any(|(i, entry)| entry.position != i)
        {
            anyhow::bail!("Index metadata entries are out of order");
        }

        if manifest.entries.is_empty() {
            return Ok(Self {
                manifest,
                store: None,
                persisted: true,
            });
        }

        if !paths.vectors.exists() {
            anyhow::bail!("Vector data missing at {:?}", paths.vectors);
        }

        let store = LanceVectorStore::open(&paths.vectors).await?;

        let positions = store.positions().await?;
        let expected: Vec<i32> = (0..manifest.entries.len())
            .map(i32::try_from)
            .collect::<Result<_, _>>()
            .context("Too many chunks")?;
        if positions != expected {
            anyhow::bail!(
                "Vector data does not match metadata ({} vectors, {} entries)",
                positions.len(),
                manifest.entries.len()
            );
        }

        if store.dimension().await? != Some(manifest.dimension) {
            anyhow::bail!("Vector dimension does not match metadata");
        }

        tracing::info!(
            "Loaded index: {} chunks (built {})",
            manifest.entries.len(),
            manifest.built_at.format("%Y-%m-%d %H:%M")
        );

        Ok(Self {
            manifest,
            store: Some(store),
            persisted: true,
        })
    }

    /// 저장된 인덱스를 로드하고, 없으면 데이터 디렉토리에서 빌드
    ///
    /// `force`가 true면 항상 다시 빌드합니다.
    pub async fn open_or_build(
        paths: &IndexPaths,
        data_dir: &Path,
        chunk_config: ChunkConfig,
        embedder: &dyn EmbeddingProvider,
        force: bool,
    ) -> Result<Self> {
        if !force {
            if let Some(index) = Self::load(paths, embedder.name()).await? {
                return Ok(index);
            }
        }

        let documents = DocumentLoader::with_defaults()
            .load(data_dir)
            .context("Failed to load documents")?;
        if documents.is_empty() {
            tracing::warn!(
                "No documents found in {:?}; answers will use an empty context",
                data_dir
            );
        }

        let chunker = WindowChunker::new(chunk_config);
        let chunks = chunker.chunk_all(&documents);
        tracing::info!(
            "Chunked {} documents into {} chunks ({})",
            documents.len(),
            chunks.len(),
            chunker.name()
        );

        Self::build(paths, &chunks, embedder).await
    }

    /// 최근접 k개 청크 검색 (가장 유사한 것부터)
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            anyhow::bail!("k must be at least 1");
        }

        let Some(store) = &self.store else {
            return Ok(vec![]);
        };

        if vector.len() != self.manifest.dimension {
            anyhow::bail!(
                "Query vector dimension {} does not match index dimension {}",
                vector.len(),
                self.manifest.dimension
            );
        }

        let results = store.search(vector, k).await?;

        results
            .into_iter()
            .map(|r| {
                let chunk = usize::try_from(r.position)
                    .ok()
                    .and_then(|p| self.manifest.entries.get(p))
                    .ok_or_else(|| anyhow::anyhow!("Unknown vector position {}", r.position))?;
                Ok(ScoredChunk {
                    chunk: chunk.clone(),
                    distance: r.distance,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.manifest.embedding_model
    }

    pub fn stats(&self) -> IndexStats {
        let mut sources: Vec<&str> = self
            .manifest
            .entries
            .iter()
            .map(|e| e.source.as_str())
            .collect();
        sources.sort_unstable();
        sources.dedup();

        IndexStats {
            chunk_count: self.manifest.entries.len(),
            source_count: sources.len(),
            dimension: self.manifest.dimension,
            embedding_model: self.manifest.embedding_model.clone(),
            built_at: self.persisted.then_some(self.manifest.built_at),
            persisted: self.persisted,
        }
    }
}

/// 매니페스트 원자적 기록 (임시 파일 -> rename)
async fn write_manifest(path: &Path, manifest: &IndexManifest) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(manifest).context("Failed to serialize index metadata")?;

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move index metadata into place: {:?}", path))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
