//! Route handlers for the generation API.

// Handlers must be `async` and take extractors by value to satisfy axum's
// `Handler` trait, even when the body never awaits.
#![allow(clippy::unused_async, clippy::needless_pass_by_value)]

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

use crate::models::event::StatusEvent;
use crate::models::session::GenerationRequest;
use crate::orchestrator::channel::Subscription;
use crate::server::AppState;
use crate::AppError;

/// Response body for a successful creation request.
#[derive(Debug, Serialize)]
struct CreatedResponse {
    session_id: String,
    message: &'static str,
}

/// Map an [`AppError`] to an HTTP error response with a JSON body.
fn error_response(err: &AppError) -> Response {
    let status = match err {
        AppError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Config(_) => StatusCode::BAD_REQUEST,
        AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// `POST /api/generate` — admit a new generation session.
///
/// Returns the session id immediately; generation runs asynchronously.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    match state.manager.create(request) {
        Ok(session_id) => (
            StatusCode::OK,
            Json(CreatedResponse {
                session_id,
                message: "Generation started",
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/events/{session_id}` — SSE stream of status events.
///
/// Replays the most recent event on connect, then streams live events.
/// The stream ends after the terminal event.
pub async fn events(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.manager.subscribe(&session_id) {
        Ok(subscription) => Sse::new(event_stream(subscription))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Turn a channel subscription into an SSE event stream.
///
/// Intermediate events lost to receiver lag are skipped; the stream always
/// closes after yielding a terminal event.
fn event_stream(
    subscription: Subscription,
) -> impl Stream<Item = std::result::Result<Event, std::convert::Infallible>> {
    let Subscription { replay, receiver } = subscription;

    stream::unfold(
        (replay, receiver, false),
        |(mut replay, mut receiver, done)| async move {
            if done {
                return None;
            }

            let status_event = loop {
                if let Some(event) = replay.take() {
                    break event;
                }
                match receiver.recv().await {
                    Ok(event) => break event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged, intermediate events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            };

            let terminal = status_event.is_terminal();
            let sse_event = match Event::default().json_data(&status_event) {
                Ok(event) => event,
                Err(err) => {
                    warn!(%err, "failed to serialize status event");
                    return None;
                }
            };
            Some((Ok(sse_event), (None, receiver, terminal)))
        },
    )
}

/// `GET /api/status/{session_id}` — latest session snapshot.
pub async fn status(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.manager.get(&session_id) {
        Ok(snapshot) => Json::<StatusEvent>(snapshot).into_response(),
        Err(err) => error_response(&err),
    }
}

/// `GET /api/video/{session_id}` — rendered video bytes.
pub async fn video(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let path = match state.manager.video_path(&session_id) {
        Ok(path) => path,
        Err(err) => return error_response(&err),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "video/mp4".to_owned()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"animation_{session_id}.mp4\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to read rendered video");
            error_response(&AppError::NotFound(format!(
                "video for session {session_id} is unavailable"
            )))
        }
    }
}

/// `GET /api/history` — completed sessions, newest first.
pub async fn history(State(state): State<AppState>) -> Response {
    Json(state.manager.history()).into_response()
}

/// `GET /health` — liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
