//! HTTP 핸들러
//!
//! `/chat`과 `/ask`는 요청마다 request id span을 열고,
//! 잘못된 본문이나 빈 입력은 모델 호출 전에 400으로 거절합니다.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use super::context::AppContext;
use super::error::ApiError;

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// 검색 없이 페르소나 프롬프트로 바로 응답
pub async fn chat(
    State(state): State<Arc<AppContext>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());

    async move {
        let message = require_text(payload.map(|Json(body)| body.message), "No message provided")?;

        let prompt = state.prompts().render_chat(&message);
        let answer = state.model().complete(&prompt).await.map_err(|e| {
            tracing::error!("Chat completion failed: {}", e);
            ApiError::from(e)
        })?;

        Ok(Json(ChatResponse { message: answer }))
    }
    .instrument(span)
    .await
}

/// 검색 → 생성 파이프라인
pub async fn ask(
    State(state): State<Arc<AppContext>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let span = tracing::info_span!("ask", request_id = %Uuid::new_v4());

    async move {
        let question =
            require_text(payload.map(|Json(body)| body.question), "No question provided")?;

        let result = state.pipeline.run(&question).await.map_err(|e| {
            tracing::error!("RAG generation failed: {}", e);
            ApiError::from(e)
        })?;
        tracing::info!("Answered with {} context chunks", result.context.len());

        Ok(Json(AskResponse {
            answer: result.answer.unwrap_or_default(),
        }))
    }
    .instrument(span)
    .await
}

// ============================================================================
// Validation
// ============================================================================

/// 본문 파싱 실패, 필드 누락, 공백뿐인 입력은 모두 400
fn require_text(
    field: Result<Option<String>, JsonRejection>,
    missing: &str,
) -> Result<String, ApiError> {
    let value = field.map_err(|rejection| {
        tracing::info!("Rejected request body: {}", rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    })?;

    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => {
            tracing::info!("Rejected request: {}", missing);
            Err(ApiError::BadRequest(missing.to_string()))
        }
    }
}
