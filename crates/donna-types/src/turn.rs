//! Turn definitions and the closed expression/animation vocabularies.

use crate::lipsync::Lipsync;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Facial expressions the avatar rig understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FacialExpression {
    #[serde(rename = "smile")]
    Smile,
    #[serde(rename = "sad")]
    Sad,
    #[serde(rename = "angry")]
    Angry,
    #[serde(rename = "surprised")]
    Surprised,
    #[serde(rename = "funnyFace")]
    FunnyFace,
    /// Neutral face. Used when the model omits an expression.
    #[default]
    #[serde(rename = "default")]
    Default,
}

impl FacialExpression {
    /// Every expression, in the order they are presented to the model.
    pub const ALL: [FacialExpression; 6] = [
        Self::Smile,
        Self::Sad,
        Self::Angry,
        Self::Surprised,
        Self::FunnyFace,
        Self::Default,
    ];

    /// Returns the wire name of this expression.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smile => "smile",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::FunnyFace => "funnyFace",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for FacialExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacialExpression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown facial expression: {}", s))
    }
}

/// Body animations the avatar rig understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Animation {
    #[serde(rename = "Talking_0")]
    Talking0,
    #[serde(rename = "Talking_1")]
    Talking1,
    #[serde(rename = "Talking_2")]
    Talking2,
    Crying,
    Laughing,
    Rumba,
    /// Resting pose. Used when the model omits an animation.
    #[default]
    Idle,
    Terrified,
    Angry,
}

impl Animation {
    /// Every animation, in the order they are presented to the model.
    pub const ALL: [Animation; 9] = [
        Self::Talking0,
        Self::Talking1,
        Self::Talking2,
        Self::Crying,
        Self::Laughing,
        Self::Rumba,
        Self::Idle,
        Self::Terrified,
        Self::Angry,
    ];

    /// Returns the wire name of this animation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Talking0 => "Talking_0",
            Self::Talking1 => "Talking_1",
            Self::Talking2 => "Talking_2",
            Self::Crying => "Crying",
            Self::Laughing => "Laughing",
            Self::Rumba => "Rumba",
            Self::Idle => "Idle",
            Self::Terrified => "Terrified",
            Self::Angry => "Angry",
        }
    }
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Animation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown animation: {}", s))
    }
}

/// A validated turn that has not been enriched yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTurn {
    /// Zero-based position in the reply. Also keys the turn's scratch artifacts.
    pub index: usize,
    /// Display text. Never empty.
    pub text: String,
    pub facial_expression: FacialExpression,
    pub animation: Animation,
}

impl DraftTurn {
    /// Completes the turn with its synthesized audio and lipsync timeline.
    ///
    /// `audio` is the transport-encoded (base64) speech payload.
    pub fn enrich(self, audio: String, lipsync: Lipsync) -> Turn {
        Turn {
            index: self.index,
            text: self.text,
            facial_expression: self.facial_expression,
            animation: self.animation,
            audio,
            lipsync,
        }
    }
}

/// A fully enriched turn, ready to be sent to the front end.
///
/// Fields are public for serialization; generated replies obtain a `Turn`
/// from [`DraftTurn::enrich`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub index: usize,
    pub text: String,
    pub facial_expression: FacialExpression,
    pub animation: Animation,
    /// Base64-encoded speech audio.
    pub audio: String,
    pub lipsync: Lipsync,
}

/// Ordered turns produced by a single normalization pass.
///
/// Indices are always contiguous and start at zero; the only way to add a
/// turn is [`TurnBatch::push`], which assigns the next index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnBatch {
    turns: Vec<DraftTurn>,
}

impl TurnBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns the index it was given.
    pub fn push(
        &mut self,
        text: impl Into<String>,
        facial_expression: FacialExpression,
        animation: Animation,
    ) -> usize {
        let index = self.turns.len();
        self.turns.push(DraftTurn {
            index,
            text: text.into(),
            facial_expression,
            animation,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DraftTurn> {
        self.turns.iter()
    }
}

impl IntoIterator for TurnBatch {
    type Item = DraftTurn;
    type IntoIter = std::vec::IntoIter<DraftTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.into_iter()
    }
}

impl<'a> IntoIterator for &'a TurnBatch {
    type Item = &'a DraftTurn;
    type IntoIter = std::slice::Iter<'a, DraftTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Response payload returned to the caller of the chat endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub messages: Vec<Turn>,
}
