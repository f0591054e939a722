#![forbid(unsafe_code)]

//! Webhook-triggered rebuild agent for statically generated sites.
//!
//! On every trigger the agent pulls the repository, stops the site server,
//! clears the stale output directory, regenerates the site, and starts the
//! server again. See [`orchestrator::rebuild::RebuildOrchestrator`].

pub mod config;
pub mod errors;
pub mod http;
pub mod mode;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
