#![forbid(unsafe_code)]

//! `git-webhook-listener`: webhook-triggered site rebuild agent binary.
//!
//! Loads configuration, starts the site server, and serves the trigger
//! endpoint until a shutdown signal arrives or, under the `shutdown` failure
//! mode, a rebuild fails.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use git_webhook_listener::config::GlobalConfig;
use git_webhook_listener::http::{server, AppState};
use git_webhook_listener::mode::FailureMode;
use git_webhook_listener::orchestrator::rebuild::RebuildOrchestrator;
use git_webhook_listener::orchestrator::supervisor::ProcessSupervisor;
use git_webhook_listener::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "git-webhook-listener",
    about = "Rebuild and re-serve a static site when a git webhook arrives",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the repository path.
    #[arg(long)]
    repository: Option<PathBuf>,

    /// Override what the service does after a failed rebuild.
    #[arg(long, value_enum)]
    on_failure: Option<FailureMode>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("git-webhook-listener bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
        .inspect_err(|err| error!(%err, "git-webhook-listener exiting with error"))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load(args.config.as_deref())?;
    if let Some(repository) = args.repository {
        config.set_repository_path(repository)?;
    }
    if let Some(on_failure) = args.on_failure {
        config.on_failure = on_failure;
    }
    let config = Arc::new(config);
    info!(
        repository = %config.repository_path.display(),
        output = %config.output_path().display(),
        on_failure = ?config.on_failure,
        "configuration loaded"
    );

    // ── Bind the listener before anything is spawned ────
    let listener = server::bind(config.bind_addr()).await?;

    // ── Start the site server ───────────────────────────
    let supervisor = Arc::new(ProcessSupervisor::new(
        config.commands.serve.clone(),
        config.stop_grace(),
    ));
    supervisor.start(&config.repository_path).await?;

    let orchestrator = Arc::new(RebuildOrchestrator::from_config(
        &config,
        Arc::clone(&supervisor),
    ));

    // ── Serve the trigger endpoint ──────────────────────
    let ct = CancellationToken::new();
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        orchestrator: Arc::clone(&orchestrator),
        shutdown: ct.clone(),
    });

    let http_state = Arc::clone(&state);
    let mut http_handle =
        tokio::spawn(async move { server::serve_on(listener, http_state).await });

    let finished = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            None
        }
        () = ct.cancelled() => {
            info!("shutdown requested by failed rebuild");
            None
        }
        joined = &mut http_handle => {
            error!("HTTP listener exited unexpectedly");
            Some(joined)
        }
    };
    ct.cancel();

    let joined = match finished {
        Some(joined) => joined,
        None => http_handle.await,
    };
    let served = joined
        .unwrap_or_else(|err| Err(AppError::Http(format!("HTTP task panicked: {err}"))));
    if let Err(ref err) = served {
        error!(%err, "HTTP listener failed");
    }

    // ── Stop the site server ────────────────────────────
    if let Err(err) = orchestrator.shutdown().await {
        error!(%err, "failed to stop site server during shutdown");
    }

    served?;

    if let Some(run) = orchestrator.last_run() {
        if let (FailureMode::Shutdown, Some(step)) = (config.on_failure, run.failed_step()) {
            return Err(AppError::Aborted(format!(
                "rebuild {} failed at step {step}; operator intervention required",
                run.id
            )));
        }
    }

    info!("git-webhook-listener shut down");
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
