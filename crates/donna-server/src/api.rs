//! API handlers for the Donna server.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use donna_types::ChatResponse;
use donna_voice::{ErrorCategory, VoiceError, VoiceInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Request body for `POST /chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    /// The user's message. Empty or absent asks for the greeting.
    #[serde(default)]
    pub message: String,
}

/// Response body for `GET /voices`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::BadModelOutput => StatusCode::BAD_GATEWAY,
        ErrorCategory::Upstream => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Tooling | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCategory::BadRequest => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg, "category": ErrorCategory::BadRequest }),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg }),
            ),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": msg, "category": ErrorCategory::Upstream }),
            ),
            ApiError::Voice(err) => {
                let category = err.category();
                let status = status_for(category);
                if status.is_server_error() {
                    tracing::error!(
                        category = category.as_str(),
                        stage = err.stage().map(|s| s.as_str()),
                        turn = err.turn_index(),
                        "request failed: {}",
                        err
                    );
                }

                let mut body = serde_json::json!({
                    "error": err.to_string(),
                    "category": category,
                });
                if let Some(stage) = err.stage() {
                    body["stage"] = serde_json::json!(stage.as_str());
                }
                if let Some(turn) = err.turn_index() {
                    body["turn"] = serde_json::json!(turn);
                }
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Handler for `POST /chat`.
///
/// An empty message gets the greeting; a server without chat or synthesis
/// credentials answers every message with the missing-keys reply.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return state
            .canned
            .greeting
            .clone()
            .map(Json)
            .ok_or_else(|| ApiError::BadRequest("message is empty".to_string()));
    }

    if !state.credentials_ready {
        return state
            .canned
            .missing_keys
            .clone()
            .map(Json)
            .ok_or_else(|| {
                ApiError::Unavailable("chat or speech credentials are not configured".to_string())
            });
    }

    let response = state.service.respond(&payload.message).await?;
    Ok(Json(response))
}

/// Handler for `GET /voices`.
pub async fn voices_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let voices = state.synthesizer.list_voices().await?;
    if voices.is_empty() {
        return Err(ApiError::NotFound(
            "synthesizer backend has no voice catalogue".to_string(),
        ));
    }
    Ok(Json(VoicesResponse { voices }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_voice::{NormalizeError, StageId};
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn turn_failure_reports_stage_and_turn() {
        let err = VoiceError::Turn {
            index: 1,
            source: Box::new(VoiceError::VisemeExtractionFailed("exit 2".to_string())),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["category"], "tooling");
        assert_eq!(json["stage"], "extract_visemes");
        assert_eq!(json["turn"], 1);
    }

    #[tokio::test]
    async fn bad_model_output_is_bad_gateway() {
        let err = VoiceError::from(NormalizeError::UnrecognizedShape);
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = body_json(response).await;
        assert_eq!(json["category"], "bad_model_output");
        assert!(json.get("stage").is_none());
        assert!(json.get("turn").is_none());
    }

    #[tokio::test]
    async fn upstream_and_timeout_statuses() {
        let upstream = VoiceError::UpstreamUnavailable {
            service: "openai",
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(
            ApiError::from(upstream).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let timeout = VoiceError::ToolTimeout {
            stage: StageId::Transcode,
            limit: Duration::from_secs(60),
        };
        let response = ApiError::from(timeout).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["stage"], "transcode");
    }
}
