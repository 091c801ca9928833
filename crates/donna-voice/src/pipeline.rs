//! Turn enrichment: speech, transcode and visemes, one turn at a time.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. For each turn the stages
//! run strictly one after another; a stage only starts once the previous one
//! has returned and its output file exists. After the last stage the turn's
//! audio is read back and base64-encoded, and the viseme file is parsed into
//! a [`Lipsync`].
//!
//! Turns of a batch are enriched sequentially. The first failure aborts the
//! batch and is reported against the turn that caused it; turns that already
//! succeeded are discarded with it.

use crate::artifacts::{ArtifactArena, TurnArtifacts};
use crate::config::ToolConfig;
use crate::error::{StageId, VoiceError};
use crate::process::run_tool;
use crate::retry::RetryPolicy;
use crate::tts::SpeechSynthesizer;
use async_trait::async_trait;
use base64::Engine as _;
use donna_types::{DraftTurn, Lipsync, Turn, TurnBatch};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Everything a stage needs to process one turn.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub turn: &'a DraftTurn,
    pub voice_id: &'a str,
    pub artifacts: &'a TurnArtifacts,
}

/// One step of turn enrichment, from an input artifact to an output artifact.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// File this stage must leave behind for the next one.
    fn output<'a>(&self, artifacts: &'a TurnArtifacts) -> &'a Path;

    async fn run(&self, ctx: StageContext<'_>) -> Result<(), VoiceError>;
}

/// Synthesizes the turn's text to `message_<index>.mp3`.
pub struct SpeakStage {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    retry: RetryPolicy,
}

impl SpeakStage {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, retry: RetryPolicy) -> Self {
        Self { synthesizer, retry }
    }
}

#[async_trait]
impl Stage for SpeakStage {
    fn id(&self) -> StageId {
        StageId::Speak
    }

    fn output<'a>(&self, artifacts: &'a TurnArtifacts) -> &'a Path {
        &artifacts.audio
    }

    async fn run(&self, ctx: StageContext<'_>) -> Result<(), VoiceError> {
        self.retry
            .run("speech_synthesis", || {
                self.synthesizer
                    .synthesize(ctx.voice_id, &ctx.turn.text, &ctx.artifacts.audio)
            })
            .await
    }
}

/// Converts the synthesized audio to WAV with ffmpeg.
pub struct TranscodeStage {
    ffmpeg: PathBuf,
}

impl TranscodeStage {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[async_trait]
impl Stage for TranscodeStage {
    fn id(&self) -> StageId {
        StageId::Transcode
    }

    fn output<'a>(&self, artifacts: &'a TurnArtifacts) -> &'a Path {
        &artifacts.wav
    }

    async fn run(&self, ctx: StageContext<'_>) -> Result<(), VoiceError> {
        let args = [
            OsStr::new("-y"),
            OsStr::new("-i"),
            ctx.artifacts.audio.as_os_str(),
            ctx.artifacts.wav.as_os_str(),
        ];
        run_tool(StageId::Transcode, &self.ffmpeg, args, None, None).await?;
        Ok(())
    }
}

/// Extracts mouth cues from the WAV with Rhubarb Lip Sync.
pub struct VisemeStage {
    rhubarb: PathBuf,
    recognizer: String,
}

impl VisemeStage {
    pub fn new(rhubarb: impl Into<PathBuf>, recognizer: impl Into<String>) -> Self {
        Self {
            rhubarb: rhubarb.into(),
            recognizer: recognizer.into(),
        }
    }
}

#[async_trait]
impl Stage for VisemeStage {
    fn id(&self) -> StageId {
        StageId::ExtractVisemes
    }

    fn output<'a>(&self, artifacts: &'a TurnArtifacts) -> &'a Path {
        &artifacts.visemes
    }

    async fn run(&self, ctx: StageContext<'_>) -> Result<(), VoiceError> {
        let args = [
            OsStr::new("-f"),
            OsStr::new("json"),
            OsStr::new("-o"),
            ctx.artifacts.visemes.as_os_str(),
            ctx.artifacts.wav.as_os_str(),
            OsStr::new("-r"),
            OsStr::new(&self.recognizer),
        ];
        run_tool(StageId::ExtractVisemes, &self.rhubarb, args, None, None).await?;
        Ok(())
    }
}

/// Ordered enrichment stages plus the scratch arena they write into.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    arena: ArtifactArena,
    voice_id: String,
    stage_timeout: Duration,
}

impl Pipeline {
    /// Creates a pipeline with no stages.
    pub fn new(arena: ArtifactArena, voice_id: impl Into<String>, stage_timeout: Duration) -> Self {
        Self {
            stages: Vec::new(),
            arena,
            voice_id: voice_id.into(),
            stage_timeout,
        }
    }

    /// speak → transcode → extract visemes.
    pub fn standard(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        tools: &ToolConfig,
        retry: RetryPolicy,
        arena: ArtifactArena,
        voice_id: impl Into<String>,
    ) -> Self {
        Self::new(arena, voice_id, tools.timeout())
            .with_stage(SpeakStage::new(synthesizer, retry))
            .with_stage(TranscodeStage::new(&tools.ffmpeg))
            .with_stage(VisemeStage::new(&tools.rhubarb, tools.recognizer.clone()))
    }

    /// Appends a stage after the existing ones.
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    async fn run_stage(&self, stage: &dyn Stage, ctx: StageContext<'_>) -> Result<(), VoiceError> {
        let id = stage.id();
        let started = Instant::now();

        tokio::time::timeout(self.stage_timeout, stage.run(ctx))
            .await
            .map_err(|_| VoiceError::ToolTimeout {
                stage: id,
                limit: self.stage_timeout,
            })?
            .map_err(|e| e.in_stage(id))?;

        let output = stage.output(ctx.artifacts);
        let written = tokio::fs::metadata(output)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(VoiceError::stage_failure(
                id,
                format!("{} produced no output at {}", id, output.display()),
            ));
        }

        tracing::debug!(
            turn = ctx.turn.index,
            stage = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage complete"
        );
        Ok(())
    }

    /// Runs every stage for one turn, then attaches audio and lipsync.
    pub async fn enrich_turn(
        &self,
        draft: DraftTurn,
        artifacts: &TurnArtifacts,
    ) -> Result<Turn, VoiceError> {
        let ctx = StageContext {
            turn: &draft,
            voice_id: &self.voice_id,
            artifacts,
        };
        for stage in &self.stages {
            self.run_stage(stage.as_ref(), ctx).await?;
        }

        let audio = tokio::fs::read(&artifacts.audio).await.map_err(|e| {
            VoiceError::SynthesisFailed(format!(
                "failed to read {}: {}",
                artifacts.audio.display(),
                e
            ))
        })?;
        let visemes = tokio::fs::read(&artifacts.visemes).await.map_err(|e| {
            VoiceError::VisemeExtractionFailed(format!(
                "failed to read {}: {}",
                artifacts.visemes.display(),
                e
            ))
        })?;
        let lipsync: Lipsync = serde_json::from_slice(&visemes).map_err(|e| {
            VoiceError::VisemeExtractionFailed(format!("unreadable viseme output: {}", e))
        })?;
        if !lipsync.is_well_ordered() {
            return Err(VoiceError::VisemeExtractionFailed(
                "mouth cues are out of order".to_string(),
            ));
        }

        tracing::debug!(
            turn = draft.index,
            cues = lipsync.mouth_cues.len(),
            lipsync_secs = lipsync.duration(),
            audio_bytes = audio.len(),
            "turn enriched"
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(&audio);
        Ok(draft.enrich(encoded, lipsync))
    }

    /// Enriches every turn of `batch` in order. All or nothing.
    pub async fn enrich_batch(
        &self,
        batch: TurnBatch,
        request_id: Uuid,
    ) -> Result<Vec<Turn>, VoiceError> {
        let span = tracing::info_span!("enrich_batch", %request_id, turns = batch.len());
        async move {
            let scratch = self.arena.acquire(request_id)?;
            let mut turns = Vec::with_capacity(batch.len());

            for draft in batch {
                let index = draft.index;
                let artifacts = scratch.slot(index);
                let turn = self
                    .enrich_turn(draft, &artifacts)
                    .await
                    .map_err(|e| VoiceError::Turn {
                        index,
                        source: Box::new(e),
                    })?;
                turns.push(turn);
            }

            if let Err(e) = scratch.close() {
                tracing::warn!("failed to release scratch directory: {}", e);
            }
            tracing::info!(turns = turns.len(), "batch enriched");
            Ok(turns)
        }
        .instrument(span)
        .await
    }
}
