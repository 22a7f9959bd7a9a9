//! portfolio-chat - 포트폴리오 챗봇 백엔드
//!
//! 로컬 문서 코퍼스를 청크로 나누고 임베딩해 LanceDB 인덱스로 저장한 뒤,
//! 질문마다 상위 k개 청크를 검색해 언어 모델 프롬프트에 넣는 RAG 서버입니다.
//! OPENAI_API_KEY가 있으면 OpenAI, 없으면 로컬 Ollama를 사용합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod prompt;
pub mod rag;
pub mod server;

// Re-exports
pub use collector::{load_documents, Document, DocumentLoader, LoaderConfig};
pub use config::{ModelBackend, Settings};
pub use embedding::{create_embedder, EmbeddingProvider, OllamaEmbedding, OpenAiEmbedding};
pub use knowledge::{
    Chunk, ChunkConfig, ChunkRecord, Chunker, EmbeddingIndex, IndexPaths, IndexStats,
    LanceVectorStore, Retriever, ScoredChunk, SearchResult, VectorEntry, VectorStore,
    WindowChunker,
};
pub use llm::{
    create_language_model, GenerationOptions, LanguageModel, ModelError, OllamaChat, OpenAiChat,
};
pub use prompt::{PromptAssembler, DEFAULT_PERSONA};
pub use rag::{RagPipeline, RagState};
pub use server::{router, serve, ApiError, AppContext};
