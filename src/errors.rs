//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering every rebuild and hosting failure.
///
/// Step errors carry a message that already names the failing command or
/// path together with the underlying cause, so a single log line is enough
/// to tell which step of a rebuild broke and why.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The site server could not be launched.
    Launch(String),
    /// Signalling or reaping the site server failed.
    Termination(String),
    /// A stop was requested while no site server is tracked.
    NoProcess(String),
    /// A start was requested while a site server is already tracked.
    AlreadyRunning(String),
    /// Source synchronization (`git pull`) failed.
    Sync(String),
    /// Removing the stale output directory failed.
    Cleanup(String),
    /// Static-site generation failed.
    Generation(String),
    /// A rebuild is already in flight.
    Busy(String),
    /// The service stopped because a rebuild failed under the `shutdown`
    /// failure mode.
    Aborted(String),
    /// HTTP listener failure.
    Http(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Termination(msg) => write!(f, "termination: {msg}"),
            Self::NoProcess(msg) => write!(f, "no process: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::Sync(msg) => write!(f, "sync: {msg}"),
            Self::Cleanup(msg) => write!(f, "cleanup: {msg}"),
            Self::Generation(msg) => write!(f, "generation: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Aborted(msg) => write!(f, "aborted: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
