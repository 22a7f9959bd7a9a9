//! API 에러 타입
//!
//! 모든 에러 응답은 `{"error": msg}` 형태입니다.
//! 모델 실패는 내부 에러 내용을 숨기고 고정 메시지로 500을 반환합니다.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::llm::ModelError;

/// 클라이언트에 노출되는 모델 실패 메시지 (내부 에러 내용은 숨김)
pub const MODEL_FAILURE_MESSAGE: &str = "Sorry, I'm having trouble right now. Please try again.";

// ============================================================================
// ApiError
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Model(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                MODEL_FAILURE_MESSAGE.to_string(),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        let bad = ApiError::BadRequest("No message provided".to_string()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let model = ApiError::from(ModelError::Timeout {
            backend: "openai".to_string(),
            after: Duration::from_secs(30),
        })
        .into_response();
        assert_eq!(model.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
