//! Donna server library logic.

pub mod api;
pub mod api_upload;
pub mod canned;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use canned::CannedReplies;
use config::Config;
use donna_voice::stt::MAX_STT_INPUT_BYTES;
use donna_voice::{
    ArtifactArena, ConversationService, ElevenLabsSynthesizer, OpenAiChat, PiperSynthesizer,
    Pipeline, RetryPolicy, SpeechSynthesizer, SynthesizerBackend, VoiceError,
    WhisperTranscriber,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Chat → normalize → enrich → assemble.
    pub service: Arc<ConversationService>,
    /// Same synthesizer the pipeline speaks with; also answers `/voices`.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Pre-rendered greeting and missing-keys replies.
    pub canned: CannedReplies,
    /// False when the chat or synthesis backend lacks its credentials.
    pub credentials_ready: bool,
}

/// Maximum request body size for JSON routes (64 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Headroom for multipart framing around the audio payload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the shared state from configuration.
///
/// # Errors
///
/// Returns `VoiceError::Config` if an HTTP client cannot be constructed.
pub fn build_state(config: &Config) -> Result<AppState, VoiceError> {
    let retry = RetryPolicy::new(
        config.pipeline.retry_attempts,
        Duration::from_millis(config.pipeline.retry_base_delay_ms),
    );

    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.synthesizer.backend {
        SynthesizerBackend::ElevenLabs => {
            Arc::new(ElevenLabsSynthesizer::new(config.synthesizer.clone())?)
        }
        SynthesizerBackend::Piper => Arc::new(PiperSynthesizer::from_config(&config.synthesizer)),
    };

    let chat = OpenAiChat::new(config.chat.clone())?
        .with_retry(retry)
        .with_max_turns(config.pipeline.max_turns);

    let pipeline = Pipeline::standard(
        synthesizer.clone(),
        &config.tools,
        retry,
        ArtifactArena::new(&config.pipeline.scratch_dir),
        config.synthesizer.voice_id.clone(),
    );

    let mut service = ConversationService::new(Arc::new(chat), pipeline, config.pipeline.max_turns);
    if config.transcriber.is_enabled() {
        service = service.with_transcriber(Arc::new(WhisperTranscriber::new(
            &config.transcriber.model,
            &config.transcriber.binary,
        )));
    } else {
        tracing::info!("no transcriber configured, /talk is disabled");
    }

    let credentials_ready = config.chat.is_configured() && config.synthesizer.is_configured();
    if !credentials_ready {
        tracing::warn!("chat or synthesizer credentials missing, serving canned replies only");
    }

    Ok(AppState {
        service: Arc::new(service),
        synthesizer,
        canned: CannedReplies::load(&config.assets.dir),
        credentials_ready,
    })
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Voice uploads need a larger body limit than JSON.
    let upload_routes = Router::new()
        .route("/talk", post(api_upload::talk_handler))
        .layer(DefaultBodyLimit::max(
            MAX_STT_INPUT_BYTES + MULTIPART_OVERHEAD_BYTES,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(api::chat_handler))
        .route("/voices", get(api::voices_handler))
        .merge(upload_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
