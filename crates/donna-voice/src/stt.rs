use crate::error::{StageId, VoiceError};
use crate::process::run_tool;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns recorded speech into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// whisper.cpp-compatible binary reading audio from stdin.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model_path: PathBuf,
    binary_path: PathBuf,
    timeout: Duration,
}

impl WhisperTranscriber {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            timeout: STT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::InvalidInput("audio upload is empty".to_string()));
        }
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::InvalidInput(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        // -m <model>, -f - reads the audio from stdin; stdout carries the text.
        let args = [
            "-m".into(),
            self.model_path.clone().into_os_string(),
            "-f".into(),
            "-".into(),
        ];
        let stdout = run_tool(
            StageId::Transcribe,
            &self.binary_path,
            args,
            Some(audio),
            Some(self.timeout),
        )
        .await?;

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        tracing::debug!(chars = text.len(), "transcribed audio");
        Ok(text)
    }
}
