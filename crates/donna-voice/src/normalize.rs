//! Turns a chat model's raw reply into a [`TurnBatch`].
//!
//! The model is asked for a JSON array of turns but, depending on the model
//! and its JSON mode, it answers either with the bare array or with an object
//! wrapping the array under `messages`. Both shapes decode into
//! [`ModelOutput`].
//!
//! Policy:
//! - The reply is hard-capped: elements past `max_turns` are dropped before
//!   validation, with a warning.
//! - A missing `facialExpression` becomes `default`, a missing `animation`
//!   becomes `Idle`.
//! - An element with empty text, or with an expression or animation outside
//!   the closed vocabularies, is rejected on its own. The rest of the batch
//!   survives.
//! - A reply with no surviving turn is an error.

use crate::error::NormalizeError;
use donna_types::{Animation, FacialExpression, TurnBatch};
use serde::Deserialize;
use serde_json::Value;

/// The two shapes a model reply may take.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ModelOutput {
    Bare(Vec<Value>),
    Wrapped { messages: Vec<Value> },
}

impl ModelOutput {
    /// Decodes either shape from raw model text.
    pub fn decode(raw: &str) -> Result<Self, NormalizeError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| NormalizeError::MalformedModelOutput(e.to_string()))?;
        serde_json::from_value(value).map_err(|_| NormalizeError::UnrecognizedShape)
    }

    pub fn into_elements(self) -> Vec<Value> {
        match self {
            Self::Bare(elements) => elements,
            Self::Wrapped { messages } => messages,
        }
    }
}

/// Why a single element of the model reply was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRejection {
    /// Position of the element in the model reply.
    pub position: usize,
    pub reason: String,
}

/// Result of a normalization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub batch: TurnBatch,
    pub rejected: Vec<TurnRejection>,
    /// Number of elements dropped by the turn cap.
    pub truncated: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTurn {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    facial_expression: Option<String>,
    #[serde(default)]
    animation: Option<String>,
}

fn validate(element: Value) -> Result<(String, FacialExpression, Animation), String> {
    if !element.is_object() {
        return Err("turn is not an object".to_string());
    }
    let raw: RawTurn =
        serde_json::from_value(element).map_err(|e| format!("turn has invalid fields: {}", e))?;

    let text = raw.text.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err("turn has no text".to_string());
    }

    let facial_expression = match raw.facial_expression.as_deref() {
        None => FacialExpression::default(),
        Some(value) => value.parse()?,
    };
    let animation = match raw.animation.as_deref() {
        None => Animation::default(),
        Some(value) => value.parse()?,
    };

    Ok((text.to_string(), facial_expression, animation))
}

/// Normalizes a raw model reply into at most `max_turns` validated turns.
pub fn normalize(raw: &str, max_turns: usize) -> Result<Normalized, NormalizeError> {
    let mut elements = ModelOutput::decode(raw)?.into_elements();

    let truncated = elements.len().saturating_sub(max_turns);
    if truncated > 0 {
        tracing::warn!(
            received = elements.len(),
            max_turns,
            "model reply exceeds turn cap, truncating"
        );
        elements.truncate(max_turns);
    }

    let mut batch = TurnBatch::new();
    let mut rejected = Vec::new();
    for (position, element) in elements.into_iter().enumerate() {
        match validate(element) {
            Ok((text, facial_expression, animation)) => {
                batch.push(text, facial_expression, animation);
            }
            Err(reason) => {
                tracing::warn!(position, %reason, "rejecting turn from model reply");
                rejected.push(TurnRejection { position, reason });
            }
        }
    }

    if batch.is_empty() {
        return Err(NormalizeError::NoUsableTurns {
            rejected: rejected.len(),
        });
    }

    Ok(Normalized {
        batch,
        rejected,
        truncated,
    })
}
