//! Server configuration loading from file and environment variables.

use donna_voice::{
    ChatConfig, PipelineConfig, SynthesizerBackend, SynthesizerConfig, ToolConfig,
    TranscriberConfig,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Chat-completion backend.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Speech synthesizer backend.
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,

    /// External audio tools.
    #[serde(default)]
    pub tools: ToolConfig,

    /// Speech-to-text for `/talk`. Disabled when no binary is set.
    #[serde(default)]
    pub transcriber: TranscriberConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Pre-rendered replies.
    #[serde(default)]
    pub assets: AssetsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "donna_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Location of the canned greeting and missing-key replies.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Directory holding `<name>_<i>.wav` and `<name>_<i>.json` pairs.
    #[serde(default = "default_assets_dir")]
    pub dir: PathBuf,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("audios")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: default_assets_dir(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DONNA_HOST` overrides `server.host`
/// - `DONNA_PORT` overrides `server.port`
/// - `DONNA_LOG_LEVEL` overrides `logging.level`
/// - `DONNA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `OPENAI_API_KEY` overrides `chat.api_key`
/// - `OPENAI_MODEL` overrides `chat.model`
/// - `ELEVEN_LABS_API_KEY` overrides `synthesizer.api_key`
/// - `ELEVEN_LABS_VOICE_ID` overrides `synthesizer.voice_id`
/// - `DONNA_TTS_BACKEND` overrides `synthesizer.backend` ("elevenlabs" or "piper")
/// - `DONNA_FFMPEG` overrides `tools.ffmpeg`
/// - `DONNA_RHUBARB` overrides `tools.rhubarb`
/// - `DONNA_SCRATCH_DIR` overrides `pipeline.scratch_dir`
/// - `DONNA_ASSETS_DIR` overrides `assets.dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting settings are unusable.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("DONNA_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("DONNA_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("DONNA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("DONNA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.chat.api_key = key;
    }
    if let Some(model) = var("OPENAI_MODEL") {
        config.chat.model = model;
    }
    if let Some(key) = var("ELEVEN_LABS_API_KEY") {
        config.synthesizer.api_key = key;
    }
    if let Some(voice) = var("ELEVEN_LABS_VOICE_ID") {
        config.synthesizer.voice_id = voice;
    }
    if let Some(backend) = var("DONNA_TTS_BACKEND") {
        match backend.as_str() {
            "elevenlabs" => config.synthesizer.backend = SynthesizerBackend::ElevenLabs,
            "piper" => config.synthesizer.backend = SynthesizerBackend::Piper,
            other => tracing::warn!(value = other, "ignoring unknown DONNA_TTS_BACKEND"),
        }
    }
    if let Some(ffmpeg) = var("DONNA_FFMPEG") {
        config.tools.ffmpeg = ffmpeg.into();
    }
    if let Some(rhubarb) = var("DONNA_RHUBARB") {
        config.tools.rhubarb = rhubarb.into();
    }
    if let Some(dir) = var("DONNA_SCRATCH_DIR") {
        config.pipeline.scratch_dir = dir.into();
    }
    if let Some(dir) = var("DONNA_ASSETS_DIR") {
        config.assets.dir = dir.into();
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.max_turns == 0 {
        return Err(ConfigError::Invalid(
            "pipeline.max_turns must be at least 1".to_string(),
        ));
    }
    if config.pipeline.retry_attempts == 0 {
        return Err(ConfigError::Invalid(
            "pipeline.retry_attempts must be at least 1".to_string(),
        ));
    }
    if config.tools.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "tools.timeout_secs must be at least 1".to_string(),
        ));
    }
    Ok(())
}
