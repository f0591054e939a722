//! HTTP listener for the trigger and health endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::handlers::{health, trigger};
use super::AppState;
use crate::{AppError, Result};

/// Build the axum router: `POST <trigger_path>` and `GET /health`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.trigger_path, post(trigger))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind the HTTP listener on `addr`.
///
/// # Errors
///
/// Returns `AppError::Http` if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind {addr}: {err}")))
}

/// Serve on an already-bound listener until the shutdown token fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails while running.
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no local address: {err}")))?;
    info!(
        %local,
        trigger_path = %state.config.trigger_path,
        "listening for incoming HTTP POST requests"
    );

    let ct = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("HTTP server error: {err}")))?;

    info!("HTTP listener shut down");
    Ok(())
}
