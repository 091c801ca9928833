//! Mouth-shape timelines produced by the viseme extractor.
//!
//! The layout matches Rhubarb Lip Sync's JSON export, so the extractor's
//! output file deserializes straight into [`Lipsync`].

use serde::{Deserialize, Serialize};

/// Rhubarb mouth shapes. `X` is the closed, idle mouth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouthShape {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    X,
}

/// One mouth shape held between `start` and `end` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    pub value: MouthShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LipsyncMetadata {
    pub sound_file: String,
    /// Audio duration in seconds.
    pub duration: f64,
}

/// Ordered mouth cues for one turn's audio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lipsync {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LipsyncMetadata>,
    pub mouth_cues: Vec<MouthCue>,
}

impl Lipsync {
    /// Returns the end time of the last cue, or zero for an empty timeline.
    pub fn duration(&self) -> f64 {
        self.mouth_cues.last().map(|c| c.end).unwrap_or(0.0)
    }

    /// Returns `true` when cues are in order and none has a negative span.
    pub fn is_well_ordered(&self) -> bool {
        self.mouth_cues.iter().all(|c| c.start <= c.end)
            && self
                .mouth_cues
                .windows(2)
                .all(|pair| pair[0].start <= pair[1].start)
    }
}
