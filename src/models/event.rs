//! Wire-facing status events pushed to session subscribers.

use serde::{Deserialize, Serialize};

use super::session::{Session, SessionError, SessionStatus};

/// Wire status enumeration exposed to clients.
///
/// Internal `pending`/`running` both map to `processing`; the two terminal
/// values are `completed` and `error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Generation or rendering in progress.
    Processing,
    /// Video rendered; terminal.
    Completed,
    /// Generation or rendering failed; terminal.
    Error,
}

impl EventStatus {
    /// Whether this status marks the end of the event stream.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl From<SessionStatus> for EventStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Pending | SessionStatus::Running => Self::Processing,
            SessionStatus::Completed => Self::Completed,
            SessionStatus::Failed => Self::Error,
        }
    }
}

/// Snapshot of a session at the moment of a state transition.
///
/// Published to the session's broadcast channel and served verbatim from the
/// polling endpoint, so push and pull clients see the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StatusEvent {
    /// Session this event belongs to.
    pub session_id: String,
    /// Wire status value.
    pub status: EventStatus,
    /// Stage presently executing, absent outside the pipeline phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Human-readable status text.
    pub message: String,
    /// URL where the rendered video can be fetched, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Structured failure cause, present on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    /// Supplementary free-form detail for the client UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StatusEvent {
    /// Build an event snapshot from the current session state.
    #[must_use]
    pub fn snapshot(session: &Session) -> Self {
        let video_url = session
            .video_path
            .as_ref()
            .filter(|_| session.status == SessionStatus::Completed)
            .map(|_| format!("/api/video/{}", session.id));

        Self {
            session_id: session.id.clone(),
            status: session.status.into(),
            current_agent: session.current_stage.clone(),
            progress: session.progress,
            message: session.message.clone(),
            video_url,
            error: session.error.clone(),
            details: None,
        }
    }

    /// Attach supplementary detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Whether this event is the last one a subscriber will see.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
