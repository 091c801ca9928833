use crate::config::SynthesizerConfig;
use crate::error::{StageId, VoiceError};
use crate::process::run_tool;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

const ELEVENLABS: &str = "elevenlabs";

/// Renders text to an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speaks `text` with `voice_id` and writes the audio to `output`.
    ///
    /// The file is fully written and closed when this returns `Ok`.
    async fn synthesize(&self, voice_id: &str, text: &str, output: &Path)
        -> Result<(), VoiceError>;

    /// Voices offered by this backend. Backends without a catalogue return an
    /// empty list.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
        Ok(Vec::new())
    }
}

/// A voice advertised by the synthesizer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

fn check_input(text: &str) -> Result<(), VoiceError> {
    if text.trim().is_empty() {
        return Err(VoiceError::SynthesisFailed("text is empty".to_string()));
    }
    if text.len() > MAX_TTS_INPUT_BYTES {
        return Err(VoiceError::SynthesisFailed(format!(
            "text exceeds maximum size: {} bytes (limit: {} bytes)",
            text.len(),
            MAX_TTS_INPUT_BYTES
        )));
    }
    Ok(())
}

fn upstream(reason: impl ToString) -> VoiceError {
    VoiceError::UpstreamUnavailable {
        service: ELEVENLABS,
        reason: reason.to_string(),
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceInfo>,
}

/// ElevenLabs text-to-speech over HTTP. Writes MP3.
#[derive(Debug, Clone)]
pub struct ElevenLabsSynthesizer {
    config: SynthesizerConfig,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: SynthesizerConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                VoiceError::Config(format!("failed to build ElevenLabs client: {}", e))
            })?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fail_for_status(response: reqwest::Response) -> VoiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            upstream(format!("HTTP {}: {}", status, body))
        } else {
            VoiceError::SynthesisFailed(format!("ElevenLabs returned {}: {}", status, body))
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        output: &Path,
    ) -> Result<(), VoiceError> {
        check_input(text)?;
        if voice_id.trim().is_empty() {
            return Err(VoiceError::Config("ElevenLabs voice id is empty".to_string()));
        }

        let body = TextToSpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.url(&format!("/v1/text-to-speech/{}", voice_id)))
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(Self::fail_for_status(response).await);
        }

        let audio = response.bytes().await.map_err(upstream)?;
        if audio.is_empty() {
            return Err(VoiceError::SynthesisFailed(
                "ElevenLabs returned an empty audio body".to_string(),
            ));
        }

        tokio::fs::write(output, &audio).await.map_err(|e| {
            VoiceError::SynthesisFailed(format!("failed to write {}: {}", output.display(), e))
        })?;

        tracing::debug!(voice_id, bytes = audio.len(), "synthesized speech via ElevenLabs");
        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
        let response = self
            .client
            .get(self.url("/v1/voices"))
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(Self::fail_for_status(response).await);
        }

        let parsed: VoicesResponse = response.json().await.map_err(|e| {
            VoiceError::SynthesisFailed(format!("unreadable voice list: {}", e))
        })?;
        Ok(parsed.voices)
    }
}

/// Local Piper TTS. Writes WAV; the transcode stage normalizes it like MP3.
///
/// A numeric voice id selects a speaker of a multi-speaker model; any other
/// voice id is ignored.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    binary: PathBuf,
    model: PathBuf,
    speed: f32,
}

impl PiperSynthesizer {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>, speed: f32) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            speed,
        }
    }

    pub fn from_config(config: &SynthesizerConfig) -> Self {
        Self::new(&config.piper_binary, &config.piper_model, config.speed)
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        output: &Path,
    ) -> Result<(), VoiceError> {
        check_input(text)?;

        if !self.model.exists() {
            return Err(VoiceError::SynthesisFailed(format!(
                "Model file not found: {:?}",
                self.model
            )));
        }

        if self.speed < 0.1 || self.speed > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut args: Vec<std::ffi::OsString> = vec![
            "--model".into(),
            self.model.clone().into_os_string(),
            "--output_file".into(),
            output.as_os_str().to_os_string(),
            // Length scale is the inverse of speed.
            "--length_scale".into(),
            (1.0 / self.speed).to_string().into(),
        ];
        if let Ok(speaker) = voice_id.parse::<u32>() {
            args.push("--speaker".into());
            args.push(speaker.to_string().into());
        }

        run_tool(
            StageId::Speak,
            &self.binary,
            args,
            Some(text.as_bytes()),
            None,
        )
        .await?;
        Ok(())
    }
}
