//! RAG 파이프라인 - retrieve 노드 → generate 노드
//!
//! 요청마다 `RagState`를 만들고 두 단계를 순서대로 통과시킵니다.
//! 검색 실패는 빈 컨텍스트로 강등되고, 생성 실패만 호출자에게 전파됩니다.

use std::sync::Arc;

use crate::knowledge::{ChunkRecord, Retriever};
use crate::llm::{LanguageModel, ModelError};
use crate::prompt::PromptAssembler;

/// 요청 단위 상태
#[derive(Debug, Clone, Default)]
pub struct RagState {
    pub question: String,
    /// 검색 순서대로의 청크 (비어 있을 수 있음)
    pub context: Vec<ChunkRecord>,
    pub answer: Option<String>,
}

impl RagState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }
}

/// 검색 → 생성 파이프라인
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Option<Retriever>,
    model: Arc<dyn LanguageModel>,
    prompts: PromptAssembler,
    top_k: usize,
}

impl RagPipeline {
    /// `retriever`가 None이면 항상 빈 컨텍스트로 생성합니다.
    pub fn new(
        retriever: Option<Retriever>,
        model: Arc<dyn LanguageModel>,
        prompts: PromptAssembler,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            model,
            prompts,
            top_k: top_k.max(1),
        }
    }

    /// 질문 하나를 끝까지 처리
    pub async fn run(&self, question: &str) -> Result<RagState, ModelError> {
        let state = self.retrieve_node(RagState::new(question)).await;
        self.generate_node(state).await
    }

    /// 컨텍스트 채우기
    pub async fn retrieve_node(&self, mut state: RagState) -> RagState {
        let Some(retriever) = &self.retriever else {
            state.context.clear();
            return state;
        };

        state.context = match retriever.retrieve(&state.question, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Retrieval failed, answering without context: {:#}", e);
                Vec::new()
            }
        };
        state
    }

    /// 프롬프트 조립 후 모델 호출
    pub async fn generate_node(&self, mut state: RagState) -> Result<RagState, ModelError> {
        let prompt = self.prompts.render_rag(&state.context, &state.question);
        let answer = self.model.complete(&prompt).await?;
        state.answer = Some(answer);
        Ok(state)
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn prompts(&self) -> &PromptAssembler {
        &self.prompts
    }
}

// ============================================================================
// Tests
// ============================================================================
