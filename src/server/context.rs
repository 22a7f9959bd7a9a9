//! 서버 공유 상태
//!
//! 인덱스, 검색기, 모델 클라이언트는 시작 시 한 번 만들어지고
//! 이후 모든 요청이 읽기 전용으로 공유합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::knowledge::{ChunkConfig, EmbeddingIndex, IndexPaths, IndexStats, Retriever};
use crate::llm::{create_language_model, LanguageModel};
use crate::prompt::PromptAssembler;
use crate::rag::RagPipeline;

pub struct AppContext {
    pub pipeline: RagPipeline,
    pub index_stats: Option<IndexStats>,
}

impl AppContext {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prompts: PromptAssembler,
        retriever: Option<Retriever>,
        top_k: usize,
    ) -> Self {
        let index_stats = retriever.as_ref().map(|r| r.index().stats());
        Self {
            pipeline: RagPipeline::new(retriever, model, prompts, top_k),
            index_stats,
        }
    }

    /// 설정으로부터 전체 상태 구성
    ///
    /// 인덱스 로드/빌드가 실패하면 빈 인덱스로 시작합니다 (`/ask`는 빈 컨텍스트로 응답).
    pub async fn initialize(settings: &Settings) -> Result<Self> {
        let prompts = PromptAssembler::from_persona_file(settings.persona_path.as_deref())?;
        let embedder = create_embedder(settings)?;
        let index = load_index(settings, embedder.as_ref()).await?;

        let retriever =
            Retriever::new(Arc::new(index), embedder).context("Failed to create retriever")?;
        let model = create_language_model(settings)?;

        Ok(Self::new(model, prompts, Some(retriever), settings.top_k))
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        self.pipeline.model()
    }

    pub fn prompts(&self) -> &PromptAssembler {
        self.pipeline.prompts()
    }
}

async fn load_index(settings: &Settings, embedder: &dyn EmbeddingProvider) -> Result<EmbeddingIndex> {
    let chunk_config = ChunkConfig::new(settings.chunk_size, settings.chunk_overlap)?;
    let paths = IndexPaths::new(&settings.index_dir);

    match EmbeddingIndex::open_or_build(&paths, &settings.data_dir, chunk_config, embedder, false)
        .await
    {
        Ok(index) => {
            let stats = index.stats();
            tracing::info!(
                "Index ready: {} chunks from {} sources ({})",
                stats.chunk_count,
                stats.source_count,
                stats.embedding_model
            );
            Ok(index)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to build index from {:?}, serving with an empty index: {:#}",
                settings.data_dir,
                e
            );
            Ok(EmbeddingIndex::empty(embedder.name()))
        }
    }
}
