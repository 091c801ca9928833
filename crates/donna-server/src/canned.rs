//! Pre-rendered replies served without calling the chat model.
//!
//! Each canned turn is a `<name>_<i>.wav` recording plus its `<name>_<i>.json`
//! viseme timeline in the assets directory. They are loaded once at startup
//! and go out through the same [`ChatResponse`] type as generated replies.

use base64::Engine as _;
use donna_types::{Animation, ChatResponse, FacialExpression, Lipsync, TurnBatch};
use std::path::Path;
use thiserror::Error;

/// Errors loading a canned reply from disk.
#[derive(Debug, Error)]
pub enum CannedError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid lipsync file {path}: {source}")]
    Lipsync {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Text and presentation of one canned turn. Audio comes from the assets.
struct Line {
    text: &'static str,
    facial_expression: FacialExpression,
    animation: Animation,
}

const GREETING: (&str, &[Line]) = (
    "intro",
    &[
        Line {
            text: "Hey dear... How was your day?",
            facial_expression: FacialExpression::Smile,
            animation: Animation::Talking1,
        },
        Line {
            text: "I missed you so much... Please don't go for so long!",
            facial_expression: FacialExpression::Sad,
            animation: Animation::Crying,
        },
    ],
);

const MISSING_KEYS: (&str, &[Line]) = (
    "api",
    &[
        Line {
            text: "Please my dear, don't forget to add your API keys!",
            facial_expression: FacialExpression::Angry,
            animation: Animation::Angry,
        },
        Line {
            text: "You don't want to ruin Donna with a crazy ChatGPT and ElevenLabs bill, right?",
            facial_expression: FacialExpression::Smile,
            animation: Animation::Laughing,
        },
    ],
);

/// Replies for an empty message and for a server without credentials.
///
/// A reply whose assets could not be loaded is `None`.
#[derive(Debug, Clone, Default)]
pub struct CannedReplies {
    pub greeting: Option<ChatResponse>,
    pub missing_keys: Option<ChatResponse>,
}

impl CannedReplies {
    /// Loads both replies from `dir`. Missing or broken assets are logged and
    /// leave the corresponding reply unset.
    pub fn load(dir: &Path) -> Self {
        Self {
            greeting: load_or_warn(dir, GREETING),
            missing_keys: load_or_warn(dir, MISSING_KEYS),
        }
    }
}

fn load_or_warn(dir: &Path, (name, lines): (&str, &[Line])) -> Option<ChatResponse> {
    match load_reply(dir, name, lines) {
        Ok(reply) => {
            tracing::debug!(name, turns = reply.messages.len(), "loaded canned reply");
            Some(reply)
        }
        Err(e) => {
            tracing::warn!(name, "canned reply unavailable: {}", e);
            None
        }
    }
}

fn load_reply(dir: &Path, name: &str, lines: &[Line]) -> Result<ChatResponse, CannedError> {
    let mut batch = TurnBatch::new();
    for line in lines {
        batch.push(line.text, line.facial_expression, line.animation);
    }

    let mut messages = Vec::with_capacity(batch.len());
    for draft in batch {
        let audio_path = dir.join(format!("{}_{}.wav", name, draft.index));
        let lipsync_path = dir.join(format!("{}_{}.json", name, draft.index));

        let audio = std::fs::read(&audio_path).map_err(|source| CannedError::Read {
            path: audio_path.display().to_string(),
            source,
        })?;
        let raw = std::fs::read(&lipsync_path).map_err(|source| CannedError::Read {
            path: lipsync_path.display().to_string(),
            source,
        })?;
        let lipsync: Lipsync =
            serde_json::from_slice(&raw).map_err(|source| CannedError::Lipsync {
                path: lipsync_path.display().to_string(),
                source,
            })?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio);
        messages.push(draft.enrich(encoded, lipsync));
    }
    Ok(ChatResponse { messages })
}
