//! Rebuild orchestration: pull → stop server → clean output → regenerate →
//! start server.
//!
//! A run executes the five steps strictly in order and aborts at the first
//! failure, returning that step's error to the caller. Runs are serialized
//! by a single-slot lock: a trigger that arrives while a run is in flight is
//! rejected with `AppError::Busy` instead of being queued or interleaved.
//!
//! Under [`FailureMode::KeepServing`] a failed run can leave no server
//! tracked; the next run then skips the stop step so it can bring the site
//! back instead of failing forever on `AppError::NoProcess`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, info_span, warn, Instrument};

use super::command::run_to_completion;
use super::supervisor::ProcessSupervisor;
use crate::config::GlobalConfig;
use crate::mode::FailureMode;
use crate::models::command::CommandSpec;
use crate::models::rebuild::{RebuildRun, Step};
use crate::{AppError, Result};

/// Proof that the caller holds the rebuild run lock.
///
/// Obtained from [`RebuildOrchestrator::try_acquire`]; dropping it releases
/// the lock.
#[derive(Debug)]
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Executes the fixed rebuild sequence against one repository.
#[derive(Debug)]
pub struct RebuildOrchestrator {
    repository_path: PathBuf,
    output_path: PathBuf,
    sync: CommandSpec,
    generate: CommandSpec,
    supervisor: Arc<ProcessSupervisor>,
    on_failure: FailureMode,
    run_lock: Arc<Mutex<()>>,
    last_run: std::sync::Mutex<Option<RebuildRun>>,
}

impl RebuildOrchestrator {
    /// Create an orchestrator for `repository_path`.
    ///
    /// `output_path` is removed before every regeneration; the caller is
    /// responsible for it lying inside the repository.
    #[must_use]
    pub fn new(
        repository_path: PathBuf,
        output_path: PathBuf,
        sync: CommandSpec,
        generate: CommandSpec,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            repository_path,
            output_path,
            sync,
            generate,
            supervisor,
            on_failure: FailureMode::default(),
            run_lock: Arc::new(Mutex::new(())),
            last_run: std::sync::Mutex::new(None),
        }
    }

    /// Build an orchestrator from resolved configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self::new(
            config.repository_path.clone(),
            config.output_path(),
            config.commands.sync.clone(),
            config.commands.generate.clone(),
            supervisor,
        )
        .with_failure_mode(config.on_failure)
    }

    /// Set the failure policy. Defaults to [`FailureMode::Shutdown`].
    #[must_use]
    pub fn with_failure_mode(mut self, on_failure: FailureMode) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Repository the orchestrator rebuilds.
    #[must_use]
    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    /// Supervisor managing the site server.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Claim the run lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Busy` if another rebuild currently holds the lock.
    pub fn try_acquire(&self) -> Result<RunPermit> {
        Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map(|guard| RunPermit { _guard: guard })
            .map_err(|_| AppError::Busy("a rebuild is already in progress".into()))
    }

    /// Whether a rebuild currently holds the run lock.
    #[must_use]
    pub fn is_rebuilding(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Acquire the run lock and execute one rebuild.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Busy` if a rebuild is already in flight, otherwise
    /// the error of the first failing step.
    pub async fn rebuild(&self) -> Result<RebuildRun> {
        let permit = self.try_acquire()?;
        self.run(permit).await
    }

    /// Execute one rebuild while holding `permit`.
    ///
    /// The finished run, successful or not, is retained as
    /// [`last_run`](Self::last_run).
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step: `AppError::Sync`,
    /// `AppError::NoProcess` / `AppError::Termination`, `AppError::Cleanup`,
    /// `AppError::Generation`, or `AppError::Launch` /
    /// `AppError::AlreadyRunning`.
    pub async fn run(&self, permit: RunPermit) -> Result<RebuildRun> {
        let mut run = RebuildRun::new(self.repository_path.clone());
        let span = info_span!(
            "rebuild",
            run_id = %run.id,
            repository = %self.repository_path.display()
        );

        let outcome = async {
            info!("rebuild started");
            let run_started = Instant::now();

            for step in Step::SEQUENCE {
                run.begin(step);
                info!(%step, "step started");
                let step_started = Instant::now();

                if let Err(err) = self.execute(step).await {
                    run.fail(err.to_string());
                    error!(
                        %step,
                        elapsed_ms = elapsed_ms(step_started),
                        %err,
                        "step failed, rebuild aborted"
                    );
                    return Err(err);
                }

                run.succeed();
                info!(%step, elapsed_ms = elapsed_ms(step_started), "step succeeded");
            }

            run.complete();
            info!(elapsed_ms = elapsed_ms(run_started), "rebuild finished");
            Ok(())
        }
        .instrument(span)
        .await;

        self.record(run.clone());
        drop(permit);
        outcome.map(|()| run)
    }

    /// Most recent completed or aborted run.
    #[must_use]
    pub fn last_run(&self) -> Option<RebuildRun> {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for any in-flight rebuild to finish, then stop the server if one
    /// is tracked.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Termination` if the tracked server cannot be stopped.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.run_lock.lock().await;
        match self.supervisor.stop().await {
            Ok(_) | Err(AppError::NoProcess(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn execute(&self, step: Step) -> Result<()> {
        match step {
            Step::Pull => self.pull().await,
            Step::StopServer => self.stop_server().await,
            Step::CleanOutput => self.clean_output().await,
            Step::Regenerate => self.regenerate().await,
            Step::StartServer => self
                .supervisor
                .start(&self.repository_path)
                .await
                .map(|_| ()),
        }
    }

    async fn stop_server(&self) -> Result<()> {
        match (self.supervisor.stop().await, self.on_failure) {
            (Ok(_), _) => Ok(()),
            (Err(AppError::NoProcess(_)), FailureMode::KeepServing) => {
                warn!("no site server tracked after an earlier failure, skipping stop");
                Ok(())
            }
            (Err(err), _) => Err(err),
        }
    }

    async fn pull(&self) -> Result<()> {
        run_to_completion(&self.sync, &self.repository_path)
            .await
            .map_err(|err| AppError::Sync(err.to_string()))
    }

    async fn regenerate(&self) -> Result<()> {
        run_to_completion(&self.generate, &self.repository_path)
            .await
            .map_err(|err| AppError::Generation(err.to_string()))
    }

    async fn clean_output(&self) -> Result<()> {
        clean_output_dir(&self.output_path).await
    }

    fn record(&self, run: RebuildRun) {
        *self
            .last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(run);
    }
}

/// Recursively remove `path`. A missing directory is not an error.
///
/// # Errors
///
/// Returns `AppError::Cleanup` for any other file-system failure.
pub async fn clean_output_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            info!(path = %path.display(), "removed stale output directory");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "output directory absent, nothing to clean");
            Ok(())
        }
        Err(err) => Err(AppError::Cleanup(format!(
            "failed to remove {}: {err}",
            path.display()
        ))),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
