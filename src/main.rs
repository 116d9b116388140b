#![forbid(unsafe_code)]

//! `chalkboard` — educational animation generation server binary.
//!
//! Bootstraps configuration, the session manager, the eviction task, and
//! the HTTP API server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use chalkboard::config::GlobalConfig;
use chalkboard::orchestrator::retention;
use chalkboard::orchestrator::session_manager::SessionManager;
use chalkboard::pipeline::stages::ScriptedBackend;
use chalkboard::server::{self, AppState};
use chalkboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chalkboard", about = "Educational animation generation server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chalkboard server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    tokio::fs::create_dir_all(&config.media_dir)
        .await
        .map_err(|err| AppError::Config(format!("cannot create media_dir: {err}")))?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Build session manager ───────────────────────────
    // The scripted backend stands in at the LLM seam; swap in a real
    // GenerationBackend implementation to wire up a provider.
    let backend = Arc::new(ScriptedBackend);
    let manager = Arc::new(SessionManager::new(Arc::clone(&config), backend));

    // ── Start eviction task ─────────────────────────────
    let ct = CancellationToken::new();
    let eviction_handle = retention::spawn_eviction_task(Arc::clone(&manager), ct.clone());
    info!("eviction task started");

    // ── Start API server ────────────────────────────────
    let state = AppState {
        manager: Arc::clone(&manager),
        config: Arc::clone(&config),
    };
    let server_ct = ct.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(state, server_ct).await {
            error!(%err, "API server failed");
        }
    });

    info!("chalkboard server ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Graceful shutdown: end every live session ───────
    let failed = manager.fail_live_sessions("server shutting down");
    if failed > 0 {
        info!(sessions = failed, "live sessions failed on shutdown");
    }

    let _ = tokio::join!(server_handle, eviction_handle);
    info!("chalkboard shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
