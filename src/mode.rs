//! Failure policy: what the service does after a rebuild run fails.
//!
//! `FailureMode` is used both as the `--on-failure` CLI flag value and as
//! the `on_failure` config key.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Host reaction to a failed rebuild run.
///
/// A failed run never continues past its failing step; this only decides
/// whether the service itself keeps running afterwards. Defaults to
/// [`FailureMode::Shutdown`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop accepting triggers and exit with an error. Default mode.
    #[default]
    Shutdown,
    /// Keep the listener up, report degraded health, accept the next trigger.
    KeepServing,
}
