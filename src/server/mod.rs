//! HTTP 서버 모듈
//!
//! axum 라우터, 핸들러, 공유 상태, API 에러 타입

mod context;
mod error;
mod handlers;
mod router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::Settings;

pub use context::AppContext;
pub use error::{ApiError, MODEL_FAILURE_MESSAGE};
pub use handlers::{AskRequest, AskResponse, ChatRequest, ChatResponse};
pub use router::router;

/// 인덱스를 준비하고 Ctrl-C까지 HTTP 요청 처리
pub async fn serve(settings: Settings) -> Result<()> {
    let state = Arc::new(AppContext::initialize(&settings).await?);

    let bind_addr = settings.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
