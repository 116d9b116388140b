//! Stage invocation types shared between the pipeline and its stages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::{ConversationTurn, ModelChoice};

/// Outcome classification of a single stage attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced a usable payload.
    Ok,
    /// Transient failure; re-invocation may succeed.
    Retry,
    /// Unrecoverable failure; aborts the pipeline immediately.
    Fatal,
}

/// Output of one pipeline stage attempt.
///
/// Owned exclusively by the pipeline during a run; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StageResult {
    /// Name of the stage that produced this result.
    pub stage_name: String,
    /// Outcome classification.
    pub status: StageStatus,
    /// Stage output, fed to the next stage as its input on `Ok`.
    pub payload: Value,
    /// Failure detail on `Retry`/`Fatal`; informs the retried invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// Successful result carrying `payload`.
    #[must_use]
    pub fn ok(stage_name: impl Into<String>, payload: Value) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Ok,
            payload,
            error: None,
        }
    }

    /// Transient failure; the pipeline may retry this stage.
    #[must_use]
    pub fn retry(stage_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Retry,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Unrecoverable failure; the pipeline aborts.
    #[must_use]
    pub fn fatal(stage_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Fatal,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Generation parameters resolved from the request and config defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    /// Model alias backing the stage invocations.
    pub model: ModelChoice,
    /// Target video duration in minutes.
    pub duration_minutes: u32,
}

/// Read-only context handed to every stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Prior conversation turns from the originating request.
    pub history: Vec<ConversationTurn>,
    /// Resolved generation parameters.
    pub config: GenerationConfig,
    /// Error detail from the previous failed attempt of the same stage,
    /// set only on retried invocations.
    pub previous_error: Option<String>,
}

impl StageContext {
    /// Build a fresh context with no retry feedback.
    #[must_use]
    pub fn new(history: Vec<ConversationTurn>, config: GenerationConfig) -> Self {
        Self {
            history,
            config,
            previous_error: None,
        }
    }

    /// Copy of this context carrying feedback from a failed attempt.
    #[must_use]
    pub fn with_feedback(&self, error: impl Into<String>) -> Self {
        Self {
            history: self.history.clone(),
            config: self.config.clone(),
            previous_error: Some(error.into()),
        }
    }
}
