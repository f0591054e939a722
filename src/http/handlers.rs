//! Request handlers for the trigger and health endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::{error, info, warn};

use super::AppState;
use crate::mode::FailureMode;
use crate::models::rebuild::{RebuildRun, RunStatus};
use crate::orchestrator::supervisor::ServerInfo;
use crate::AppError;

/// Handler for `POST <trigger_path>`.
///
/// Logs the (truncated) webhook body and starts a rebuild in the background.
/// Responds `202 Accepted` when the rebuild was started and `409 Conflict`
/// when one is already running. The rebuild outcome is only logged.
pub async fn trigger(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, &'static str) {
    info!(
        bytes = body.len(),
        payload = %preview_body(&body, state.config.max_logged_body_bytes),
        "received incoming git webhook"
    );

    let permit = match state.orchestrator.try_acquire() {
        Ok(permit) => permit,
        Err(err) => {
            warn!(%err, "rejecting trigger");
            return (StatusCode::CONFLICT, "rebuild already in progress\n");
        }
    };

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        match task_state.orchestrator.run(permit).await {
            Ok(run) => info!(run_id = %run.id, "rebuild succeeded"),
            Err(err) => on_rebuild_failure(&task_state, &err),
        }
    });

    (StatusCode::ACCEPTED, "rebuild started\n")
}

fn on_rebuild_failure(state: &AppState, err: &AppError) {
    match state.config.on_failure {
        FailureMode::Shutdown => {
            error!(%err, "rebuild failed; shutting down service (on_failure = shutdown)");
            state.shutdown.cancel();
        }
        FailureMode::KeepServing => {
            error!(%err, "rebuild failed; site may be unserved until the next successful trigger");
        }
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, or `degraded` when the last run failed.
    pub status: &'static str,
    /// Whether a rebuild is currently executing.
    pub rebuilding: bool,
    /// Tracked site server, if any.
    pub server: Option<ServerInfo>,
    /// Most recent run, if any.
    pub last_run: Option<RebuildRun>,
}

/// Handler for `GET /health`.
///
/// Returns `503 Service Unavailable` when the last rebuild failed.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let last_run = state.orchestrator.last_run();
    let degraded = matches!(
        last_run.as_ref().map(|run| &run.status),
        Some(RunStatus::Failed { .. })
    );

    let report = HealthReport {
        status: if degraded { "degraded" } else { "ok" },
        rebuilding: state.orchestrator.is_rebuilding(),
        server: state.orchestrator.supervisor().current().await,
        last_run,
    };
    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

/// Lossy UTF-8 preview of at most `max_bytes` of `body`.
///
/// The cut is moved back to the start of any multi-byte sequence it would
/// land inside, so truncation never splits a character. A marker notes how
/// many bytes were omitted.
#[must_use]
pub fn preview_body(body: &[u8], max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return String::from_utf8_lossy(body).into_owned();
    }

    // UTF-8 sequences are at most four bytes, so at most three continuation
    // bytes can precede a boundary.
    let floor = max_bytes.saturating_sub(3);
    let mut cut = max_bytes;
    while cut > floor && is_continuation(body[cut]) {
        cut -= 1;
    }
    let head = String::from_utf8_lossy(&body[..cut]);
    format!("{head}... ({} bytes omitted)", body.len() - cut)
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}
