use crate::assemble::assemble;
use crate::chat::ChatCompleter;
use crate::error::VoiceError;
use crate::normalize::normalize;
use crate::pipeline::Pipeline;
use crate::stt::Transcriber;
use donna_types::ChatResponse;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum user message size (8 KiB).
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024;

/// Answers a user message with a fully enriched reply.
pub struct ConversationService {
    chat: Arc<dyn ChatCompleter>,
    pipeline: Pipeline,
    transcriber: Option<Arc<dyn Transcriber>>,
    max_turns: usize,
}

impl ConversationService {
    pub fn new(chat: Arc<dyn ChatCompleter>, pipeline: Pipeline, max_turns: usize) -> Self {
        Self {
            chat,
            pipeline,
            transcriber: None,
            max_turns,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn accepts_audio(&self) -> bool {
        self.transcriber.is_some()
    }

    /// chat → normalize → enrich → assemble.
    ///
    /// Normalization errors are raised before any speech is synthesized.
    pub async fn respond(&self, message: &str) -> Result<ChatResponse, VoiceError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(VoiceError::InvalidInput("message is empty".to_string()));
        }
        if message.len() > MAX_MESSAGE_BYTES {
            return Err(VoiceError::InvalidInput(format!(
                "message exceeds maximum size: {} bytes (limit: {} bytes)",
                message.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("respond", %request_id);
        async move {
            let raw = self.chat.complete(message).await?;
            let normalized = normalize(&raw, self.max_turns)?;
            tracing::info!(
                turns = normalized.batch.len(),
                rejected = normalized.rejected.len(),
                truncated = normalized.truncated,
                "normalized model reply"
            );

            let turns = self
                .pipeline
                .enrich_batch(normalized.batch, request_id)
                .await?;
            Ok(assemble(turns))
        }
        .instrument(span)
        .await
    }

    /// Transcribes `audio` and answers the transcript as a user message.
    ///
    /// Returns the transcript alongside the reply.
    pub async fn respond_to_audio(
        &self,
        audio: &[u8],
    ) -> Result<(String, ChatResponse), VoiceError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| VoiceError::Config("audio input is not configured".to_string()))?;

        let transcript = transcriber.transcribe(audio).await?;
        if transcript.trim().is_empty() {
            return Err(VoiceError::InvalidInput(
                "no speech detected in audio".to_string(),
            ));
        }
        tracing::info!(chars = transcript.len(), "transcribed user audio");

        let response = self.respond(&transcript).await?;
        Ok((transcript, response))
    }
}
