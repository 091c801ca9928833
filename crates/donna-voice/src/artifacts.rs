//! Per-request scratch storage for the files the external tools exchange.
//!
//! Every request gets its own directory under the arena root, named after the
//! request id. Turn artifacts inside it are keyed by turn index
//! (`message_<index>.*`), so two requests in flight never touch each other's
//! files. The directory is deleted when the [`RequestScratch`] is dropped,
//! which covers success, failure and a cancelled request future alike.

use crate::error::VoiceError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Root directory that hands out per-request scratch directories.
#[derive(Debug, Clone)]
pub struct ArtifactArena {
    root: PathBuf,
}

impl ArtifactArena {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a fresh scratch directory for `request_id`.
    pub fn acquire(&self, request_id: Uuid) -> Result<RequestScratch, VoiceError> {
        std::fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("req-{}-", request_id))
            .tempdir_in(&self.root)?;
        tracing::debug!(%request_id, path = %dir.path().display(), "acquired scratch directory");
        Ok(RequestScratch { request_id, dir })
    }
}

/// Scratch directory owned by one request.
#[derive(Debug)]
pub struct RequestScratch {
    request_id: Uuid,
    dir: TempDir,
}

impl RequestScratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// File names for the turn at `index`.
    pub fn slot(&self, index: usize) -> TurnArtifacts {
        let stem = format!("message_{}", index);
        let base = self.dir.path();
        TurnArtifacts {
            index,
            audio: base.join(format!("{}.mp3", stem)),
            wav: base.join(format!("{}.wav", stem)),
            visemes: base.join(format!("{}.json", stem)),
        }
    }

    /// Removes the directory now, reporting any error instead of swallowing it.
    pub fn close(self) -> Result<(), VoiceError> {
        let request_id = self.request_id;
        self.dir.close()?;
        tracing::debug!(%request_id, "released scratch directory");
        Ok(())
    }
}

/// Paths of the intermediate files for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnArtifacts {
    pub index: usize,
    /// Synthesized speech as returned by the synthesizer.
    pub audio: PathBuf,
    /// Transcoded audio fed to the viseme extractor.
    pub wav: PathBuf,
    /// Viseme extractor output.
    pub visemes: PathBuf,
}
