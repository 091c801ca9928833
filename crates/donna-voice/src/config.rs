use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo-1106".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.6
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "kgG7dCoKCfLehAPWkJOE".to_string()
}

fn default_tts_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_half() -> f32 {
    0.5
}

fn default_piper_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_piper_model() -> PathBuf {
    PathBuf::from("assets/voices/en_US-lessac-medium.onnx")
}

fn default_speed() -> f32 {
    1.0
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_rhubarb() -> PathBuf {
    PathBuf::from("bin/rhubarb")
}

fn default_recognizer() -> String {
    "phonetic".to_string()
}

fn default_max_turns() -> usize {
    donna_types::DEFAULT_MAX_TURNS
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("donna-scratch")
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

/// Chat-completion collaborator settings (OpenAI-compatible API).
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP request timeout in seconds. Default: 60.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_chat_base_url(),
            model: default_chat_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ChatConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Which speech synthesizer renders turn audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesizerBackend {
    /// ElevenLabs HTTP API. Produces MP3.
    #[default]
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    /// Local Piper binary. Produces WAV.
    Piper,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    #[serde(default)]
    pub backend: SynthesizerBackend,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub base_url: String,
    /// Voice used for every turn of a reply.
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_tts_model_id")]
    pub model_id: String,
    #[serde(default = "default_half")]
    pub stability: f32,
    #[serde(default = "default_half")]
    pub similarity_boost: f32,
    #[serde(default = "default_piper_binary")]
    pub piper_binary: PathBuf,
    #[serde(default = "default_piper_model")]
    pub piper_model: PathBuf,
    /// Speech speed multiplier for Piper (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            backend: SynthesizerBackend::default(),
            api_key: String::new(),
            base_url: default_elevenlabs_base_url(),
            voice_id: default_voice_id(),
            model_id: default_tts_model_id(),
            stability: default_half(),
            similarity_boost: default_half(),
            piper_binary: default_piper_binary(),
            piper_model: default_piper_model(),
            speed: default_speed(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for SynthesizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizerConfig")
            .field("backend", &self.backend)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .field("piper_binary", &self.piper_binary)
            .field("piper_model", &self.piper_model)
            .field("speed", &self.speed)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SynthesizerConfig {
    /// Piper runs locally and needs no credentials.
    pub fn is_configured(&self) -> bool {
        match self.backend {
            SynthesizerBackend::ElevenLabs => !self.api_key.trim().is_empty(),
            SynthesizerBackend::Piper => true,
        }
    }
}

/// Shell-level tools driven by the enrichment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_rhubarb")]
    pub rhubarb: PathBuf,
    /// Rhubarb recognizer (`phonetic` or `pocketSphinx`).
    #[serde(default = "default_recognizer")]
    pub recognizer: String,
    /// Upper bound for any single pipeline stage. Default: 60.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            rhubarb: default_rhubarb(),
            recognizer: default_recognizer(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// whisper.cpp-compatible transcriber. An empty `binary` disables audio input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriberConfig {
    #[serde(default)]
    pub binary: PathBuf,
    #[serde(default)]
    pub model: PathBuf,
}

impl TranscriberConfig {
    pub fn is_enabled(&self) -> bool {
        !self.binary.as_os_str().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Replies longer than this are truncated. Default: 3.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Root of the per-request scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Total attempts for calls that fail with an upstream outage. Default: 3.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            scratch_dir: default_scratch_dir(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}
