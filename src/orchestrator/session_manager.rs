//! Session admission control and routing.
//!
//! The manager owns the keyed in-memory registry of live sessions. The
//! admission check and the registry insertion happen under one lock, so two
//! simultaneous creations can never exceed the concurrency ceiling.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span};

use crate::config::GlobalConfig;
use crate::models::event::StatusEvent;
use crate::models::session::{
    ErrorKind, GenerationRequest, ModelChoice, Session, SessionError, SessionStatus,
};
use crate::models::stage::{GenerationConfig, StageContext};
use crate::orchestrator::channel::{StatusChannel, Subscription};
use crate::orchestrator::state_machine::{self, SessionRecord};
use crate::pipeline::runner::PipelineRunner;
use crate::pipeline::stages::{default_stages, GenerationBackend};
use crate::pipeline::Stage;
use crate::render::RenderInvoker;
use crate::{AppError, Result};

/// Factory producing a fresh ordered stage list for each session run.
pub type StageFactory = Arc<dyn Fn() -> Vec<Box<dyn Stage>> + Send + Sync>;

/// One live registry entry: the mutable record plus its broadcast channel.
struct SessionEntry {
    record: SessionRecord,
    channel: Arc<StatusChannel>,
}

/// Completed-session summary served by the history endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HistoryEntry {
    /// Session identifier.
    pub session_id: String,
    /// Prompt that produced the video.
    pub prompt: String,
    /// URL where the rendered video can be fetched.
    pub video_url: String,
    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Creates sessions, enforces the concurrency ceiling, and routes
/// subscriptions and polls to the right session.
pub struct SessionManager {
    config: Arc<GlobalConfig>,
    stage_factory: StageFactory,
    invoker: Arc<RenderInvoker>,
    registry: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    /// Build a manager running the default four-stage pipeline over `backend`.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, backend: Arc<dyn GenerationBackend>) -> Self {
        let factory: StageFactory = Arc::new(move || default_stages(Arc::clone(&backend)));
        Self::with_stages(config, factory)
    }

    /// Build a manager with a custom stage factory.
    #[must_use]
    pub fn with_stages(config: Arc<GlobalConfig>, stage_factory: StageFactory) -> Self {
        let invoker = Arc::new(RenderInvoker::new(
            config.render.clone(),
            config.media_dir.clone(),
            config.render_timeout(),
        ));
        Self {
            config,
            stage_factory,
            invoker,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new session and start its state machine asynchronously.
    ///
    /// Returns the new session id immediately; generation proceeds in its
    /// own task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` when the number of live
    /// (non-terminal) sessions has reached `max_concurrent_generations`.
    /// Returns `AppError::Config` for an empty prompt.
    pub fn create(&self, request: GenerationRequest) -> Result<String> {
        let span = info_span!("create_session");
        let _guard = span.enter();

        if request.prompt.trim().is_empty() {
            return Err(AppError::Config("prompt must not be empty".into()));
        }

        let generation = GenerationConfig {
            model: request
                .model
                .or_else(|| ModelChoice::from_alias(&self.config.defaults.model))
                .unwrap_or_default(),
            duration_minutes: request
                .duration_minutes
                .unwrap_or(self.config.defaults.duration_minutes),
        };

        let session = Session::new(request.prompt, request.history);
        let session_id = session.id.clone();

        let (record, channel) = {
            let mut registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            // Admission check and insertion under the same lock.
            let live = registry
                .values()
                .filter(|entry| {
                    !entry
                        .record
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .status
                        .is_terminal()
                })
                .count();
            if u32::try_from(live).unwrap_or(u32::MAX) >= self.config.max_concurrent_generations {
                return Err(AppError::CapacityExceeded(format!(
                    "concurrent generation limit reached ({live}/{})",
                    self.config.max_concurrent_generations
                )));
            }

            let record: SessionRecord = Arc::new(RwLock::new(session));
            let channel = Arc::new(StatusChannel::new(self.config.event_buffer));
            registry.insert(
                session_id.clone(),
                SessionEntry {
                    record: Arc::clone(&record),
                    channel: Arc::clone(&channel),
                },
            );
            (record, channel)
        };

        let ctx = {
            let session = record.read().unwrap_or_else(PoisonError::into_inner);
            StageContext::new(session.history.clone(), generation)
        };
        let runner = PipelineRunner::new(
            (self.stage_factory)(),
            self.config.max_stage_retries,
            self.config.stage_timeout(),
        );
        let invoker = Arc::clone(&self.invoker);

        info!(session_id = %session_id, "session admitted");
        tokio::spawn(state_machine::drive_session(
            record, channel, runner, invoker, ctx,
        ));

        Ok(session_id)
    }

    /// Register a subscriber on a session's broadcast channel.
    ///
    /// A session that has already ended replays its terminal event
    /// immediately, so there is no missed-terminal-event race.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session id.
    pub fn subscribe(&self, session_id: &str) -> Result<Subscription> {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = registry
            .get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        Ok(entry.channel.subscribe())
    }

    /// Point-in-time snapshot of a session, for polling fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session id.
    pub fn get(&self, session_id: &str) -> Result<StatusEvent> {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = registry
            .get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        let session = entry.record.read().unwrap_or_else(PoisonError::into_inner);
        Ok(StatusEvent::snapshot(&session))
    }

    /// Path of the rendered video for a completed session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the session does not exist or has
    /// not produced a video yet.
    pub fn video_path(&self, session_id: &str) -> Result<PathBuf> {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = registry
            .get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        let session = entry.record.read().unwrap_or_else(PoisonError::into_inner);
        session
            .video_path
            .clone()
            .ok_or_else(|| AppError::NotFound(format!("no video for session {session_id}")))
    }

    /// Completed sessions, newest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<HistoryEntry> = registry
            .values()
            .filter_map(|entry| {
                let session = entry.record.read().unwrap_or_else(PoisonError::into_inner);
                (session.status == SessionStatus::Completed).then(|| HistoryEntry {
                    session_id: session.id.clone(),
                    prompt: session.prompt.clone(),
                    video_url: format!("/api/video/{}", session.id),
                    created_at: session.created_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// Number of live (non-terminal) sessions.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry
            .values()
            .filter(|entry| {
                !entry
                    .record
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .status
                    .is_terminal()
            })
            .count()
    }

    /// Evict terminal sessions past the retention window. Returns the
    /// number of sessions removed.
    pub fn evict_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention_window())
            .unwrap_or_else(|_| chrono::Duration::minutes(60));
        let cutoff = Utc::now() - retention;

        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = registry
            .iter()
            .filter_map(|(id, entry)| {
                let session = entry.record.read().unwrap_or_else(PoisonError::into_inner);
                session
                    .terminated_at
                    .is_some_and(|at| at < cutoff)
                    .then(|| id.clone())
            })
            .collect();

        for id in &expired {
            registry.remove(id);
            info!(session_id = %id, "session evicted after retention window");
        }
        expired.len()
    }

    /// Fail every live session with a shutdown summary, publishing each
    /// session's terminal event. Used during graceful shutdown so no
    /// subscriber is left waiting on a stream that will never end.
    pub fn fail_live_sessions(&self, reason: &str) -> usize {
        let entries: Vec<(SessionRecord, Arc<StatusChannel>)> = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry
                .values()
                .filter(|entry| {
                    !entry
                        .record
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .status
                        .is_terminal()
                })
                .map(|entry| (Arc::clone(&entry.record), Arc::clone(&entry.channel)))
                .collect()
        };

        for (record, channel) in &entries {
            state_machine::fail(
                record,
                channel,
                SessionError {
                    stage: None,
                    kind: ErrorKind::Generation,
                    summary: format!("generation failed: {reason}"),
                },
            );
        }
        entries.len()
    }
}
