//! HTTP trigger surface.
//!
//! A thin axum router exposing the webhook trigger endpoint and a health
//! probe. All rebuild logic lives in [`crate::orchestrator`].

pub mod handlers;
pub mod server;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GlobalConfig;
use crate::orchestrator::rebuild::RebuildOrchestrator;

/// Shared state handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Resolved configuration.
    pub config: Arc<GlobalConfig>,
    /// Rebuild workflow and, through it, the site server supervisor.
    pub orchestrator: Arc<RebuildOrchestrator>,
    /// Service-wide shutdown token; cancelled by signals or by a failed
    /// rebuild under the `shutdown` failure mode.
    pub shutdown: CancellationToken,
}
