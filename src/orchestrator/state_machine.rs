//! Session state machine: drives one session from `pending` to a terminal
//! state, publishing a status event at every transition.
//!
//! Lifecycle: `pending → running → {completed | failed}`. The pipeline
//! phase occupies progress `[0, 0.8]`; the render phase publishes `0.8`;
//! a completed session pins `1.0`. Exactly one terminal event is ever
//! published, and nothing follows it.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, info_span, warn, Instrument};

use crate::models::event::StatusEvent;
use crate::models::session::{ErrorKind, Session, SessionError, SessionStatus};
use crate::models::stage::StageContext;
use crate::orchestrator::channel::StatusChannel;
use crate::pipeline::runner::PipelineRunner;
use crate::render::{RenderError, RenderInvoker};

/// Share of overall progress occupied by the pipeline phase; the remainder
/// belongs to rendering.
const PIPELINE_PROGRESS_SHARE: f64 = 0.8;

/// Shared mutable session record guarded for short sync critical sections.
pub type SessionRecord = Arc<RwLock<Session>>;

/// Drive one session end to end: pipeline, then render, then terminal.
///
/// Runs as its own tokio task per session; sessions share no mutable state
/// with each other. Every update to the record is immediately mirrored to
/// the broadcast channel as a [`StatusEvent`] snapshot.
pub async fn drive_session(
    record: SessionRecord,
    channel: Arc<StatusChannel>,
    runner: PipelineRunner,
    invoker: Arc<RenderInvoker>,
    ctx: StageContext,
) {
    let (session_id, prompt) = {
        let session = record.read().unwrap_or_else(PoisonError::into_inner);
        (session.id.clone(), session.prompt.clone())
    };
    let span = info_span!("drive_session", session_id = %session_id);

    async {
        // pending → running.
        transition(
            &record,
            &channel,
            SessionStatus::Running,
            Some(format!(
                "Creating a {}-minute video",
                ctx.config.duration_minutes
            )),
            |session| {
                session.message = "Starting generation".into();
            },
        );
        info!(model = ?ctx.config.model, duration_minutes = ctx.config.duration_minutes, "pipeline started");

        let initial = serde_json::json!({ "topic": prompt });
        let pipeline_result = runner
            .run(initial, &ctx, |stage, fraction, message| {
                update(&record, &channel, |session| {
                    session.current_stage = Some(stage.to_owned());
                    session.progress = session.progress.max(fraction * PIPELINE_PROGRESS_SHARE);
                    session.message = message.to_owned();
                });
            })
            .await;

        let payload = match pipeline_result {
            Ok(payload) => payload,
            Err(failure) => {
                warn!(stage = %failure.stage, summary = %failure.summary, "pipeline failed");
                fail(
                    &record,
                    &channel,
                    SessionError {
                        stage: Some(failure.stage),
                        kind: ErrorKind::Generation,
                        summary: format!("generation failed: {}", failure.summary),
                    },
                );
                return;
            }
        };

        let Some(artifact) = payload.get("code").and_then(serde_json::Value::as_str) else {
            fail(
                &record,
                &channel,
                SessionError {
                    stage: None,
                    kind: ErrorKind::Generation,
                    summary: "generation failed: pipeline produced no scene source".into(),
                },
            );
            return;
        };
        let artifact = artifact.to_owned();

        update(&record, &channel, |session| {
            session.artifact = Some(artifact.clone());
            session.current_stage = Some("renderer".into());
            session.progress = session.progress.max(PIPELINE_PROGRESS_SHARE);
            session.message = "Rendering animation".into();
        });

        match invoker.render(&artifact, &session_id).await {
            Ok(video_path) => {
                info!(path = %video_path.display(), "session completed");
                transition(&record, &channel, SessionStatus::Completed, None, |session| {
                    session.current_stage = None;
                    session.progress = 1.0;
                    session.message = "Video generated successfully".into();
                    session.video_path = Some(video_path);
                });
            }
            Err(err) => {
                // Full diagnostics stay in the logs; the client only sees
                // the classification and a short summary.
                match &err {
                    RenderError::Crash { exit_code, stderr } => {
                        warn!(?exit_code, %stderr, "render engine crashed");
                    }
                    RenderError::Timeout | RenderError::InvalidArtifact(_) => {
                        warn!(%err, "render failed");
                    }
                }
                fail(
                    &record,
                    &channel,
                    SessionError {
                        stage: None,
                        kind: ErrorKind::Rendering,
                        summary: format!("rendering failed: {err}"),
                    },
                );
            }
        }
    }
    .instrument(span)
    .await;
}

/// Apply `mutate` to the record and publish the resulting snapshot.
fn update(record: &SessionRecord, channel: &StatusChannel, mutate: impl FnOnce(&mut Session)) {
    let event = {
        let mut session = record.write().unwrap_or_else(PoisonError::into_inner);
        if session.status.is_terminal() {
            // Terminal states are immutable; late callbacks are dropped.
            return;
        }
        mutate(&mut session);
        session.updated_at = chrono::Utc::now();
        StatusEvent::snapshot(&session)
    };
    channel.publish(event);
}

/// Move the session to `next`, apply `mutate`, and publish the snapshot
/// (with `details` attached when given).
///
/// Transitions the lifecycle matrix forbids are dropped, so a terminal
/// session can never be mutated or re-announced.
fn transition(
    record: &SessionRecord,
    channel: &StatusChannel,
    next: SessionStatus,
    details: Option<String>,
    mutate: impl FnOnce(&mut Session),
) {
    let event = {
        let mut session = record.write().unwrap_or_else(PoisonError::into_inner);
        if !session.can_transition_to(next) {
            return;
        }
        session.status = next;
        mutate(&mut session);
        let now = chrono::Utc::now();
        session.updated_at = now;
        if next.is_terminal() {
            session.terminated_at = Some(now);
        }
        StatusEvent::snapshot(&session)
    };
    let event = match details {
        Some(details) => event.with_details(details),
        None => event,
    };
    channel.publish(event);
}

/// Transition the session to `failed` with `error` and publish the terminal
/// event. Progress stays frozen at the value reached before the failure.
pub fn fail(record: &SessionRecord, channel: &StatusChannel, error: SessionError) {
    transition(record, channel, SessionStatus::Failed, None, |session| {
        session.current_stage = None;
        session.message = error.summary.clone();
        session.error = Some(error);
    });
}
