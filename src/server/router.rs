//! 라우터 구성 (라우트, CORS, 요청 트레이싱)

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::context::AppContext;
use super::handlers;

/// 라우터 생성
///
/// - `GET /health`
/// - `POST /chat` (페르소나 직접 응답)
/// - `POST /ask` (RAG)
///
/// 정적 사이트 프론트엔드에서 호출하므로 모든 origin을 허용합니다.
pub fn router(state: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/ask", post(handlers::ask))
        .with_state(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// CORS
// ============================================================================

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
