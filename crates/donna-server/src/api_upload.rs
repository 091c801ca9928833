//! Voice input: `POST /talk` takes recorded speech instead of text.

use crate::api::ApiError;
use crate::AppState;
use axum::extract::{Extension, Json, Multipart};
use donna_types::Turn;
use donna_voice::stt::MAX_STT_INPUT_BYTES;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Response body for `POST /talk`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TalkResponse {
    /// What the transcriber heard.
    pub transcript: String,
    pub messages: Vec<Turn>,
}

/// Handler for `POST /talk`.
///
/// Expects a multipart body whose first field is the recorded audio. The
/// transcript goes through the same pipeline as a typed message.
pub async fn talk_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TalkResponse>, ApiError> {
    if !state.service.accepts_audio() {
        return Err(ApiError::NotFound(
            "voice input is not enabled on this server".to_string(),
        ));
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("no audio provided".to_string()))?;

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

    if data.is_empty() {
        return Err(ApiError::BadRequest("audio upload is empty".to_string()));
    }
    if data.len() > MAX_STT_INPUT_BYTES {
        return Err(ApiError::BadRequest(format!(
            "audio too large: {} bytes (max {})",
            data.len(),
            MAX_STT_INPUT_BYTES
        )));
    }

    if !state.credentials_ready {
        let reply = state.canned.missing_keys.clone().ok_or_else(|| {
            ApiError::Unavailable("chat or speech credentials are not configured".to_string())
        })?;
        return Ok(Json(TalkResponse {
            transcript: String::new(),
            messages: reply.messages,
        }));
    }

    let (transcript, response) = state.service.respond_to_audio(&data).await?;
    Ok(Json(TalkResponse {
        transcript,
        messages: response.messages,
    }))
}
