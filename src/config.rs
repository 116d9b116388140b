//! Global configuration parsing, validation, and defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Configurable timeout values (seconds) for pipeline and render phases.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Hard timeout for a single stage invocation.
    #[serde(default = "default_stage_seconds")]
    pub stage_seconds: u64,
    /// Hard timeout for the render engine process.
    #[serde(default = "default_render_seconds")]
    pub render_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stage_seconds: default_stage_seconds(),
            render_seconds: default_render_seconds(),
        }
    }
}

fn default_stage_seconds() -> u64 {
    120
}

fn default_render_seconds() -> u64 {
    300
}

/// Render engine invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RenderConfig {
    /// Render engine binary (e.g. `manim`).
    #[serde(default = "default_render_command")]
    pub command: String,
    /// Arguments passed before the scene file path.
    #[serde(default = "default_render_args")]
    pub args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: default_render_command(),
            args: default_render_args(),
        }
    }
}

fn default_render_command() -> String {
    "manim".into()
}

fn default_render_args() -> Vec<String> {
    vec!["-qm".into()]
}

/// Default generation parameters applied when a request omits them.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DefaultsConfig {
    /// Model alias used when the request does not name one.
    #[serde(default = "default_model")]
    pub model: String,
    /// Target video duration in minutes.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

fn default_model() -> String {
    "sonnet".into()
}

fn default_duration_minutes() -> u32 {
    1
}

fn default_http_port() -> u16 {
    8000
}

fn default_max_concurrent_generations() -> u32 {
    3
}

fn default_max_stage_retries() -> u32 {
    2
}

fn default_retention_minutes() -> u32 {
    60
}

fn default_event_buffer() -> usize {
    64
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory where rendered videos are stored.
    pub media_dir: PathBuf,
    /// HTTP port for the API server.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Maximum concurrently running generation sessions.
    #[serde(default = "default_max_concurrent_generations")]
    pub max_concurrent_generations: u32,
    /// Retry budget per stage for transient failures.
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: u32,
    /// Minutes after a terminal transition before a session is evicted.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u32,
    /// Broadcast channel capacity for intermediate status events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Timeout configuration for stage and render phases.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Render engine invocation settings.
    #[serde(default)]
    pub render: RenderConfig,
    /// Default generation parameters.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Stage invocation timeout as a [`Duration`].
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.stage_seconds)
    }

    /// Render process timeout as a [`Duration`].
    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.render_seconds)
    }

    /// Retention window after a terminal transition as a [`Duration`].
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_minutes) * 60)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_generations == 0 {
            return Err(AppError::Config(
                "max_concurrent_generations must be greater than zero".into(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(AppError::Config(
                "event_buffer must be greater than zero".into(),
            ));
        }

        if self.render.command.trim().is_empty() {
            return Err(AppError::Config("render.command must not be empty".into()));
        }

        if self.timeouts.stage_seconds == 0 || self.timeouts.render_seconds == 0 {
            return Err(AppError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
