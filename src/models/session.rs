//! Session model and lifecycle helpers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a generation session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created but the pipeline has not started yet.
    Pending,
    /// Pipeline or render phase in progress.
    Running,
    /// Video rendered successfully; terminal.
    Completed,
    /// Generation or rendering failed; terminal.
    Failed,
}

impl SessionStatus {
    /// Whether this status is terminal (no further transitions permitted).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One prior turn of the conversation supplied at session creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConversationTurn {
    /// Either `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Video produced for this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Which failure phase produced a session error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A pipeline stage failed (fatal result or exhausted retries).
    Generation,
    /// The render engine failed (timeout, crash, or invalid artifact).
    Rendering,
}

/// Structured failure cause attached to a failed session.
///
/// Carries only a classification and a human-readable summary — raw
/// diagnostics such as engine stderr stay in the server logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionError {
    /// Name of the stage that failed, when the failure is stage-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Failure phase classification.
    pub kind: ErrorKind,
    /// Human-readable summary safe to surface to the client.
    pub summary: String,
}

/// Session domain entity held in the in-memory registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Name of the stage presently executing, absent when not running.
    pub current_stage: Option<String>,
    /// Completion fraction in `[0, 1]`, monotonically non-decreasing.
    pub progress: f64,
    /// Latest human-readable status text.
    pub message: String,
    /// Prompt that initiated this session.
    pub prompt: String,
    /// Prior conversation turns; immutable input context.
    pub history: Vec<ConversationTurn>,
    /// Pipeline output (animation source), present once the pipeline succeeds.
    pub artifact: Option<String>,
    /// Rendered video location, present iff `status` is `Completed`.
    pub video_path: Option<PathBuf>,
    /// Failure cause, present iff `status` is `Failed`.
    pub error: Option<SessionError>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Timestamp of the terminal transition; feeds retention-based eviction.
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Construct a new pending session with a generated identifier.
    #[must_use]
    pub fn new(prompt: String, history: Vec<ConversationTurn>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Pending,
            current_stage: None,
            progress: 0.0,
            message: "Session created".into(),
            prompt,
            history,
            artifact: None,
            video_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            terminated_at: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Terminal states are immutable; progress through the lifecycle is
    /// strictly forward.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (
                    SessionStatus::Running,
                    SessionStatus::Completed | SessionStatus::Failed
                )
                // A session that never left pending may still fail (e.g. shutdown).
                | (SessionStatus::Pending, SessionStatus::Failed)
        )
    }
}

/// Model alias selecting the LLM backing the pipeline stages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    /// Faster, cheaper model — default.
    #[default]
    Sonnet,
    /// Larger model for long or complex topics.
    Opus,
}

impl ModelChoice {
    /// Resolve a configured alias string; unknown aliases map to `None`.
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "sonnet" => Some(Self::Sonnet),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }
}

/// Inbound generation request from the API layer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GenerationRequest {
    /// Natural-language prompt describing the topic to animate.
    pub prompt: String,
    /// Prior conversation turns; may be empty.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Model alias; falls back to the configured default when absent.
    #[serde(default)]
    pub model: Option<ModelChoice>,
    /// Target duration in minutes; falls back to the configured default.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}
