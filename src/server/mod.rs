//! HTTP API server.
//!
//! Mounts the generation, subscription, polling, and video-fetch routes
//! behind an axum router and serves them until the cancellation token
//! fires.

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::orchestrator::session_manager::SessionManager;
use crate::{AppError, Result};

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Session registry and admission control.
    pub manager: Arc<SessionManager>,
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
}

/// Build the API router over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(routes::generate))
        .route("/api/events/{session_id}", get(routes::events))
        .route("/api/status/{session_id}", get(routes::status))
        .route("/api/video/{session_id}", get(routes::video))
        .route("/api/history", get(routes::history))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Serve the API on `config.http_port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener fails to bind, or
/// `AppError::Io` if the server fails while running.
pub async fn serve(state: AppState, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;
    info!(%bind, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .map_err(|err| AppError::Io(format!("server error: {err}")))?;

    Ok(())
}
