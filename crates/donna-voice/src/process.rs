//! Runs shell-level tools for a pipeline stage.

use crate::error::{StageId, VoiceError};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `program` to completion and returns its stdout.
///
/// The child is killed if the returned future is dropped, so a cancelled
/// request never leaves a tool running. Spawn failures and non-zero exits are
/// reported as `stage`'s failure variant; an elapsed `timeout` is reported as
/// [`VoiceError::ToolTimeout`].
pub async fn run_tool<I, S>(
    stage: StageId,
    program: &Path,
    args: I,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, VoiceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        VoiceError::stage_failure(
            stage,
            format!("failed to spawn {}: {}", program.display(), e),
        )
    })?;

    let write_task = match stdin {
        Some(input) => {
            let mut pipe = child.stdin.take().ok_or_else(|| {
                VoiceError::stage_failure(stage, "failed to open stdin".to_string())
            })?;
            let input = input.to_vec();
            // Separate task so a full stdout pipe cannot deadlock the write.
            Some(tokio::spawn(async move {
                let result = pipe.write_all(&input).await;
                drop(pipe);
                result
            }))
        }
        None => None,
    };

    let wait = child.wait_with_output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
            VoiceError::ToolTimeout { stage, limit }
        })?,
        None => wait.await,
    }
    .map_err(|e| {
        VoiceError::stage_failure(
            stage,
            format!("failed to wait for {}: {}", program.display(), e),
        )
    })?;

    if let Some(task) = write_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::stage_failure(
                    stage,
                    format!("failed to write to {} stdin: {}", program.display(), e),
                ))
            }
            Err(e) => {
                return Err(VoiceError::stage_failure(
                    stage,
                    format!("stdin task failed: {}", e),
                ))
            }
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VoiceError::stage_failure(
            stage,
            format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            ),
        ));
    }

    Ok(output.stdout)
}
