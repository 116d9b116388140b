//! Render engine subprocess execution.
//!
//! Writes the artifact to a scratch scene file, runs the configured render
//! command with `kill_on_drop(true)`, enforces a hard timeout, then locates
//! the produced video and moves it into the media directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, info_span, warn};

use crate::config::RenderConfig;
use crate::render::RenderError;

/// Executes pipeline artifacts through the external rendering engine.
#[derive(Debug, Clone)]
pub struct RenderInvoker {
    config: RenderConfig,
    media_dir: PathBuf,
    timeout: Duration,
}

impl RenderInvoker {
    /// Build an invoker storing rendered videos under `media_dir`.
    #[must_use]
    pub fn new(config: RenderConfig, media_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            config,
            media_dir,
            timeout,
        }
    }

    /// Render `artifact` (scene source) into `<media_dir>/<session_id>.mp4`.
    ///
    /// The engine runs in its own process with piped output; a timeout
    /// force-kills it. Captured stderr is attached to the error for the
    /// logs, never shown to the end user.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] classifying the failure as `Timeout`,
    /// `Crash`, or `InvalidArtifact`.
    pub async fn render(
        &self,
        artifact: &str,
        session_id: &str,
    ) -> std::result::Result<PathBuf, RenderError> {
        let span = info_span!("render", session_id);
        let _guard = span.enter();

        if artifact.trim().is_empty() {
            return Err(RenderError::InvalidArtifact("empty scene source".into()));
        }

        // Scratch directory holds the scene file and the engine's media tree;
        // it is cleaned up on drop regardless of outcome.
        let scratch = tempfile::tempdir()
            .map_err(|err| RenderError::InvalidArtifact(format!("scratch dir: {err}")))?;
        let scene_path = scratch.path().join(format!("scene_{session_id}.py"));
        tokio::fs::write(&scene_path, artifact)
            .await
            .map_err(|err| RenderError::InvalidArtifact(format!("write scene file: {err}")))?;

        let output_root = scratch.path().join("media");

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .arg("--media_dir")
            .arg(&output_root)
            .arg(&scene_path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| RenderError::Crash {
            exit_code: None,
            stderr: format!("failed to spawn render engine: {err}"),
        })?;

        info!(
            command = %self.config.command,
            pid = child.id().unwrap_or(0),
            "render engine spawned"
        );

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(RenderError::Crash {
                    exit_code: None,
                    stderr: format!("failed to collect engine output: {err}"),
                });
            }
            Err(_) => {
                // The child is dropped by wait_with_output on timeout and
                // kill_on_drop terminates it; nothing left to reap here.
                warn!(timeout = ?self.timeout, "render engine timed out, killed");
                return Err(RenderError::Timeout);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                exit_code = output.status.code(),
                stderr_bytes = stderr.len(),
                "render engine exited unsuccessfully"
            );
            return Err(RenderError::Crash {
                exit_code: output.status.code(),
                stderr,
            });
        }

        let produced = find_video(&output_root).ok_or_else(|| {
            RenderError::InvalidArtifact("engine produced no video file".into())
        })?;

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|err| RenderError::InvalidArtifact(format!("media dir: {err}")))?;
        let final_path = self.media_dir.join(format!("{session_id}.mp4"));
        tokio::fs::copy(&produced, &final_path)
            .await
            .map_err(|err| RenderError::InvalidArtifact(format!("copy video: {err}")))?;

        info!(path = %final_path.display(), "video rendered");
        Ok(final_path)
    }
}

/// Depth-first search of the engine's media tree for the first `.mp4` file.
fn find_video(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut dirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else if path.extension().is_some_and(|ext| ext == "mp4") {
            return Some(path);
        }
    }

    dirs.into_iter().find_map(|dir| find_video(&dir))
}
