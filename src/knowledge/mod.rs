//! Knowledge 모듈 - 검색 증강 생성(RAG)용 지식 인덱스
//!
//! - Chunker: 고정 윈도우 텍스트 분할
//! - LanceDB: 벡터 데이터 저장 및 코사인 거리 검색
//! - Index: 벡터 + 메타데이터 매니페스트 빌드/로드 (손상 시 재빌드)
//! - Retriever: 질문 임베딩 후 상위 k개 청크 검색

mod chunker;
mod index;
mod lance;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{Chunk, ChunkConfig, Chunker, WindowChunker};
pub use index::{ChunkRecord, EmbeddingIndex, IndexPaths, IndexStats, ScoredChunk};
pub use lance::LanceVectorStore;
pub use retriever::Retriever;
pub use vector::{SearchResult, VectorEntry, VectorStore};
