//! Turn synthesis for the Donna conversational avatar.
//!
//! Takes the loosely structured output of a chat model, normalizes it into a
//! bounded list of turns, and enriches every turn with synthesized speech and
//! a lip-sync timeline so the front end can play them back in order.
//!
//! The flow for one request is:
//!
//! ```text
//! chat model ─▶ normalize ─▶ TurnBatch ─▶ Pipeline (speak ─▶ transcode ─▶ visemes) ─▶ assemble
//! ```
//!
//! Speech synthesis, audio transcoding and viseme extraction are external
//! collaborators. Each request gets a private scratch directory from the
//! [`ArtifactArena`], removed as soon as the request finishes or is dropped.

pub mod artifacts;
pub mod assemble;
pub mod chat;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod process;
pub mod retry;
pub mod service;
pub mod stt;
pub mod tts;

pub use artifacts::{ArtifactArena, RequestScratch, TurnArtifacts};
pub use assemble::assemble;
pub use chat::{ChatCompleter, OpenAiChat};
pub use config::{
    ChatConfig, PipelineConfig, SynthesizerBackend, SynthesizerConfig, ToolConfig,
    TranscriberConfig,
};
pub use error::{ErrorCategory, NormalizeError, StageId, VoiceError};
pub use normalize::{normalize, ModelOutput, Normalized, TurnRejection};
pub use pipeline::{Pipeline, SpeakStage, Stage, StageContext, TranscodeStage, VisemeStage};
pub use retry::RetryPolicy;
pub use service::ConversationService;
pub use stt::{Transcriber, WhisperTranscriber};
pub use tts::{ElevenLabsSynthesizer, PiperSynthesizer, SpeechSynthesizer, VoiceInfo};
