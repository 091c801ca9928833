use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Steps of request processing that call out to an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Speech-to-text for uploaded audio.
    Transcribe,
    /// Text-to-speech for a turn.
    Speak,
    /// Container conversion of the synthesized audio.
    Transcode,
    /// Mouth-shape extraction from the transcoded audio.
    ExtractVisemes,
}

impl StageId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Speak => "speak",
            Self::Transcode => "transcode",
            Self::ExtractVisemes => "extract_visemes",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning raw model output into a [`donna_types::TurnBatch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("model output is not valid JSON: {0}")]
    MalformedModelOutput(String),

    #[error("model output is neither a list of turns nor an object with a `messages` list")]
    UnrecognizedShape,

    #[error("model output contained no usable turns ({rejected} rejected)")]
    NoUsableTurns { rejected: usize },
}

/// Coarse error classes surfaced to callers.
///
/// Front ends re-prompt on `BadModelOutput` and show a tooling error for
/// `Tooling` and `Upstream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadModelOutput,
    Tooling,
    Upstream,
    BadRequest,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadModelOutput => "bad_model_output",
            Self::Tooling => "tooling",
            Self::Upstream => "upstream",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("audio transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("viseme extraction failed: {0}")]
    VisemeExtractionFailed(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("{stage} timed out after {limit:?}")]
    ToolTimeout { stage: StageId, limit: Duration },

    #[error("{service} is unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    /// A stage failure attributed to one turn of a batch.
    #[error("turn {index}: {source}")]
    Turn {
        index: usize,
        #[source]
        source: Box<VoiceError>,
    },

    /// A failure raised inside a pipeline stage whose own error does not
    /// name the stage (upstream outages, configuration, scratch I/O).
    #[error("{stage}: {source}")]
    Stage {
        stage: StageId,
        #[source]
        source: Box<VoiceError>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("scratch storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Builds the failure variant that belongs to `stage`.
    pub fn stage_failure(stage: StageId, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            StageId::Transcribe => Self::TranscriptionFailed(message),
            StageId::Speak => Self::SynthesisFailed(message),
            StageId::Transcode => Self::TranscodeFailed(message),
            StageId::ExtractVisemes => Self::VisemeExtractionFailed(message),
        }
    }

    /// Returns the stage that produced this error, if any.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::SynthesisFailed(_) => Some(StageId::Speak),
            Self::TranscodeFailed(_) => Some(StageId::Transcode),
            Self::VisemeExtractionFailed(_) => Some(StageId::ExtractVisemes),
            Self::TranscriptionFailed(_) => Some(StageId::Transcribe),
            Self::ToolTimeout { stage, .. } => Some(*stage),
            Self::Stage { stage, .. } => Some(*stage),
            Self::Turn { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Returns the turn this error is attributed to, if any.
    pub fn turn_index(&self) -> Option<usize> {
        match self {
            Self::Turn { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Records that this error came out of `stage`, unless it already says so.
    pub fn in_stage(self, stage: StageId) -> Self {
        if self.stage() == Some(stage) {
            self
        } else {
            Self::Stage {
                stage,
                source: Box::new(self),
            }
        }
    }

    /// Strips turn and stage attribution and returns the underlying error.
    pub fn root(&self) -> &VoiceError {
        match self {
            Self::Turn { source, .. } | Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Normalize(_) => ErrorCategory::BadModelOutput,
            Self::SynthesisFailed(_)
            | Self::TranscodeFailed(_)
            | Self::VisemeExtractionFailed(_)
            | Self::TranscriptionFailed(_)
            | Self::ToolTimeout { .. } => ErrorCategory::Tooling,
            Self::UpstreamUnavailable { .. } => ErrorCategory::Upstream,
            Self::Turn { source, .. } | Self::Stage { source, .. } => source.category(),
            Self::InvalidInput(_) => ErrorCategory::BadRequest,
            Self::Config(_) | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a retry might succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::UpstreamUnavailable { .. })
    }
}
