//! Render engine invocation.
//!
//! Turns a pipeline artifact into a playable video by delegating to the
//! external rendering engine in an isolated child process.

pub mod invoker;

use std::fmt::{Display, Formatter};

pub use invoker::RenderInvoker;

/// Render failure classification.
///
/// Raw engine diagnostics (stderr) stay attached here for the logs and are
/// never surfaced to the end user. There is no retry at this layer — a
/// render failure is terminal for its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Engine exceeded the configured hard timeout and was killed.
    Timeout,
    /// Engine exited unsuccessfully or could not be spawned.
    Crash {
        /// Process exit code when one was observed.
        exit_code: Option<i32>,
        /// Captured stderr for diagnostics.
        stderr: String,
    },
    /// Artifact was unusable or the engine produced no video.
    InvalidArtifact(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "render timed out"),
            Self::Crash { exit_code, .. } => match exit_code {
                Some(code) => write!(f, "render engine exited with code {code}"),
                None => write!(f, "render engine crashed"),
            },
            Self::InvalidArtifact(msg) => write!(f, "invalid artifact: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}
