//! Synchronous external command execution for rebuild steps.
//!
//! Runs a configured [`CommandSpec`] to completion inside the repository
//! directory, forwards its captured output into the log at debug level, and
//! turns spawn failures and non-zero exits into a [`CommandFailure`] that the
//! orchestrator maps onto the step-specific error.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use crate::models::command::CommandSpec;

/// Why an external command did not succeed.
#[derive(Debug)]
pub enum CommandFailure {
    /// The process could not be started at all.
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The process ran and exited unsuccessfully.
    Exit {
        /// Command line that ran.
        command: String,
        /// Exit status reported by the OS.
        status: ExitStatus,
        /// Last non-empty line written to stderr, if any.
        stderr_tail: Option<String>,
    },
}

impl Display for CommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(f, "failed to start `{command}`: {source}")
            }
            Self::Exit {
                command,
                status,
                stderr_tail,
            } => {
                write!(f, "`{command}` {}", describe_status(*status))?;
                if let Some(tail) = stderr_tail {
                    write!(f, ": {tail}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CommandFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Exit { .. } => None,
        }
    }
}

/// Run `spec` in `working_dir` and wait for it to exit.
///
/// Stdin is closed; stdout and stderr are captured and logged line by line.
///
/// # Errors
///
/// Returns [`CommandFailure::Spawn`] if the program cannot be started and
/// [`CommandFailure::Exit`] if it exits with a non-zero status.
pub async fn run_to_completion(
    spec: &CommandSpec,
    working_dir: &Path,
) -> std::result::Result<(), CommandFailure> {
    let command = spec.to_string();
    let started = Instant::now();

    let output = Command::new(spec.program())
        .args(spec.args())
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CommandFailure::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        debug!(command, stream = "stdout", "{line}");
    }
    for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
        debug!(command, stream = "stderr", "{line}");
    }

    debug!(
        command,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        status = %describe_status(output.status),
        "external command finished"
    );

    if output.status.success() {
        Ok(())
    } else {
        Err(CommandFailure::Exit {
            command,
            status: output.status,
            stderr_tail: last_line(&stderr),
        })
    }
}

/// Human-readable exit status, e.g. `exited with code 1`.
#[must_use]
pub fn describe_status(status: ExitStatus) -> String {
    if status.success() {
        return "exited normally (code 0)".to_owned();
    }
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "terminated by signal".to_owned()
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}
