//! Retriever - 질문 임베딩 후 인덱스에서 상위 k개 청크 검색
//!
//! 질문은 인덱스를 빌드한 것과 같은 임베딩 모델로 임베딩되어야 합니다.
//! 다른 임베딩 공간끼리 비교하면 결과가 무의미해지므로 생성 시 검증합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;

use super::index::{ChunkRecord, EmbeddingIndex};

/// 검색기
#[derive(Clone)]
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// 인덱스와 임베딩 프로바이더를 묶어 검색기 생성
    ///
    /// 임베딩 모델이 인덱스의 모델과 다르면 에러입니다.
    pub fn new(index: Arc<EmbeddingIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if index.embedding_model() != embedder.name() {
            anyhow::bail!(
                "Embedding model mismatch: index uses {}, query embedder is {}",
                index.embedding_model(),
                embedder.name()
            );
        }
        Ok(Self { index, embedder })
    }

    /// 질문과 가장 유사한 청크 k개 (유사한 순)
    ///
    /// 인덱스가 비어 있으면 임베딩 호출 없이 빈 목록을 반환합니다.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<ChunkRecord>> {
        if self.index.is_empty() {
            return Ok(vec![]);
        }

        let vector = self
            .embedder
            .embed(question)
            .await
            .context("Failed to embed question")?;

        let results = self.index.query(&vector, k).await?;
        tracing::debug!(
            "Retrieved {} chunks (best distance: {:?})",
            results.len(),
            results.first().map(|r| r.distance)
        );

        Ok(results.into_iter().map(|r| r.chunk).collect())
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Document;
    use crate::knowledge::chunker::{ChunkConfig, Chunker, WindowChunker};
    use crate::knowledge::index::IndexPaths;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// 글자 'a', 'b' 빈도 기반 2차원 임베딩
    struct LetterEmbedding;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedding {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        t.matches('a').count() as f32 + 0.01,
                        t.matches('b').count() as f32 + 0.01,
                    ]
                })
                .collect())
        }

        fn name(&self) -> &str {
            "test/letters"
        }
    }

    /// 항상 실패하는 임베딩 (호출되면 안 되는 경우 확인용)
    struct FailingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedding {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding backend unavailable")
        }

        fn name(&self) -> &str {
            "test/letters"
        }
    }

    fn doc(name: &str, text: &str) -> Document {
        Document {
            source_path: PathBuf::from(name),
            text: text.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_retrieve_returns_chunks_in_similarity_order() {
        let dir = TempDir::new().unwrap();
        let docs = vec![doc("a.md", "aaaa"), doc("b.md", "bbbb"), doc("ab.md", "aab")];
        let chunks = WindowChunker::new(ChunkConfig::new(100, 10).unwrap()).chunk_all(&docs);
        let index = EmbeddingIndex::build(&IndexPaths::new(dir.path()), &chunks, &LetterEmbedding)
            .await
            .unwrap();

        let retriever = Retriever::new(Arc::new(index), Arc::new(LetterEmbedding)).unwrap();
        let results = retriever.retrieve("aaa", 2).await.unwrap();

        let sources: Vec<&str> = results.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "ab.md"]);
    }

    #[tokio::test]
    async fn test_empty_index_skips_embedding() {
        let index = EmbeddingIndex::empty("test/letters");
        let retriever = Retriever::new(Arc::new(index), Arc::new(FailingEmbedding)).unwrap();
        let results = retriever.retrieve("anything", 4).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let index = EmbeddingIndex::empty("openai/text-embedding-3-small");
        assert!(Retriever::new(Arc::new(index), Arc::new(LetterEmbedding)).is_err());
    }
}
