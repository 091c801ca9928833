//! Chat-completion collaborator.

use crate::config::ChatConfig;
use crate::error::{NormalizeError, VoiceError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use donna_types::{Animation, FacialExpression, DEFAULT_MAX_TURNS};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI: &str = "openai";

/// Produces the raw model reply for a user message.
///
/// The reply is unvalidated text; [`crate::normalize`] turns it into turns.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, user_message: &str) -> Result<String, VoiceError>;
}

/// Builds the persona prompt that pins the reply format and vocabularies.
pub fn system_prompt(max_turns: usize) -> String {
    let expressions: Vec<&str> = FacialExpression::ALL.iter().map(|e| e.as_str()).collect();
    let animations: Vec<&str> = Animation::ALL.iter().map(|a| a.as_str()).collect();
    format!(
        "You are Donna, a friendly virtual assistant with a 3D avatar.\n\
         You will always reply with a JSON array of messages. With a maximum of {} messages.\n\
         Each message has a text, facialExpression, and animation property.\n\
         The different facial expressions are: {}.\n\
         The different animations are: {}.",
        max_turns,
        expressions.join(", "),
        animations.join(", ")
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

fn upstream(reason: impl ToString) -> VoiceError {
    VoiceError::UpstreamUnavailable {
        service: OPENAI,
        reason: reason.to_string(),
    }
}

/// OpenAI-compatible `/chat/completions` client in JSON mode.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    config: ChatConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
    system_prompt: String,
}

impl OpenAiChat {
    pub fn new(config: ChatConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build chat client: {}", e)))?;
        Ok(Self {
            config,
            client,
            retry: RetryPolicy::default(),
            system_prompt: system_prompt(DEFAULT_MAX_TURNS),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.system_prompt = system_prompt(max_turns);
        self
    }

    async fn request(&self, user_message: &str) -> Result<String, VoiceError> {
        let body = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(upstream)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(upstream(format!("HTTP {}: {}", status, body)));
            }
            return Err(VoiceError::Config(format!(
                "chat completion rejected with {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            NormalizeError::MalformedModelOutput(format!("unreadable completion: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                NormalizeError::MalformedModelOutput("completion has no content".to_string())
                    .into()
            })
    }
}

#[async_trait]
impl ChatCompleter for OpenAiChat {
    async fn complete(&self, user_message: &str) -> Result<String, VoiceError> {
        let raw = self
            .retry
            .run("chat_completion", || self.request(user_message))
            .await?;
        tracing::debug!(model = %self.config.model, bytes = raw.len(), "received model reply");
        Ok(raw)
    }
}
