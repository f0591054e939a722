//! Site server supervision.
//!
//! The supervisor is the sole owner of the long-running site server child
//! process. At most one server is tracked at a time: `start` refuses to
//! launch a second one and `stop` refuses to run when nothing is tracked.
//! The child is spawned with `kill_on_drop(true)` so it never outlives the
//! service, and its stdout/stderr are forwarded into the log.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::command::describe_status;
use crate::models::command::CommandSpec;
use crate::{AppError, Result};

/// Read-only snapshot of the tracked server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// OS process identifier.
    pub pid: u32,
    /// Directory the server was started in.
    pub working_dir: PathBuf,
    /// When the server was launched.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ServerProcess {
    child: Child,
    info: ServerInfo,
}

/// Owns the lifecycle of one long-running site server process.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: CommandSpec,
    stop_grace: Duration,
    current: Mutex<Option<ServerProcess>>,
}

impl ProcessSupervisor {
    /// Create a supervisor that launches `command` and grants it
    /// `stop_grace` to exit after a termination request.
    #[must_use]
    pub fn new(command: CommandSpec, stop_grace: Duration) -> Self {
        Self {
            command,
            stop_grace,
            current: Mutex::new(None),
        }
    }

    /// Launch the server in `working_dir` without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyRunning` if a server is already tracked, or
    /// `AppError::Launch` if the process cannot be spawned (missing binary,
    /// permission denied, bad working directory).
    pub async fn start(&self, working_dir: &Path) -> Result<ServerInfo> {
        let mut current = self.current.lock().await;
        if let Some(ref running) = *current {
            return Err(AppError::AlreadyRunning(format!(
                "site server already tracked (pid {}); stop it first",
                running.info.pid
            )));
        }

        let mut child = Command::new(self.command.program())
            .args(self.command.args())
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Launch(format!(
                    "failed to start `{}` in {}: {err}",
                    self.command,
                    working_dir.display()
                ))
            })?;

        let pid = child.id().ok_or_else(|| {
            AppError::Launch(format!("`{}` exited before it could be tracked", self.command))
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, pid, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, pid, "stderr"));
        }

        let info = ServerInfo {
            pid,
            working_dir: working_dir.to_path_buf(),
            started_at: Utc::now(),
        };
        info!(
            pid,
            command = %self.command,
            working_dir = %working_dir.display(),
            "site server started"
        );

        *current = Some(ServerProcess {
            child,
            info: info.clone(),
        });
        Ok(info)
    }

    /// Request termination of the tracked server and wait until it has exited.
    ///
    /// Sends SIGTERM (a hard kill on non-Unix targets) and waits up to the
    /// configured grace period before force-killing. The handle is cleared
    /// only once the exit status has been reaped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoProcess` if nothing is tracked, or
    /// `AppError::Termination` if signalling or reaping the process fails.
    pub async fn stop(&self) -> Result<ExitStatus> {
        let mut current = self.current.lock().await;
        let Some(server) = current.as_mut() else {
            return Err(AppError::NoProcess(
                "no site server is tracked; nothing to stop".into(),
            ));
        };
        let pid = server.info.pid;

        request_termination(&mut server.child, pid)?;

        let status = match tokio::time::timeout(self.stop_grace, server.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                return Err(AppError::Termination(format!(
                    "failed to wait for site server pid {pid}: {err}"
                )));
            }
            Err(_) => {
                warn!(
                    pid,
                    grace_secs = self.stop_grace.as_secs_f64(),
                    "site server did not exit within grace period, forcing kill"
                );
                server.child.kill().await.map_err(|err| {
                    AppError::Termination(format!("failed to force-kill site server pid {pid}: {err}"))
                })?;
                server.child.wait().await.map_err(|err| {
                    AppError::Termination(format!("failed to reap site server pid {pid}: {err}"))
                })?
            }
        };

        *current = None;
        info!(pid, status = %describe_status(status), "site server stopped");
        Ok(status)
    }

    /// Snapshot of the tracked server, if any.
    pub async fn current(&self) -> Option<ServerInfo> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|server| server.info.clone())
    }

    /// Whether a server handle is currently tracked.
    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child, pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id()` is `None` once the child has already been reaped.
    if child.id().is_none() {
        return Ok(());
    }

    let raw = i32::try_from(pid)
        .map_err(|err| AppError::Termination(format!("pid {pid} out of range: {err}")))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        // ESRCH: exited on its own but not yet reaped.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(AppError::Termination(format!(
            "failed to send SIGTERM to site server pid {pid}: {errno}"
        ))),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, pid: u32) -> Result<()> {
    child.start_kill().map_err(|err| {
        AppError::Termination(format!("failed to kill site server pid {pid}: {err}"))
    })
}

async fn forward_output<R>(stream: R, pid: u32, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "site_server", pid, stream = name, "{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!(target: "site_server", pid, stream = name, %err, "output stream closed");
                break;
            }
        }
    }
}
