//! Vector Store - 벡터 저장소 트레이트 및 타입
//!
//! 벡터는 빌드 순서(`position`)로 식별되며, 같은 순서의 메타데이터 테이블과
//! 1:1로 대응합니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// 빌드 순서 (0-based, 메타데이터 인덱스와 동일)
    pub position: i32,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 빌드 순서
    pub position: i32,
    /// 코사인 거리 (0.0 = 동일 방향, 작을수록 유사)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (거리 오름차순, 동일 거리는 position 오름차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 저장된 모든 position (오름차순)
    async fn positions(&self) -> Result<Vec<i32>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 벡터 차원 (저장소가 비어 있으면 None)
    async fn dimension(&self) -> Result<Option<usize>>;
}

/// 검색 결과 정렬: 거리 오름차순, 동점은 먼저 삽입된 것 우선
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.position.cmp(&b.position))
    });
}

// ============================================================================
// Tests
// ============================================================================
