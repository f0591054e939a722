//! Rebuild run model: the five ordered steps and their recorded outcomes.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the rebuild sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Synchronize the repository (`git pull`).
    Pull,
    /// Stop the running site server.
    StopServer,
    /// Remove the previously generated output directory.
    CleanOutput,
    /// Run the static-site generator.
    Regenerate,
    /// Launch the site server again.
    StartServer,
}

impl Step {
    /// Fixed execution order of a rebuild run.
    pub const SEQUENCE: [Self; 5] = [
        Self::Pull,
        Self::StopServer,
        Self::CleanOutput,
        Self::Regenerate,
        Self::StartServer,
    ];

    /// Stable snake-case name used in logs and health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::StopServer => "stop_server",
            Self::CleanOutput => "clean_output",
            Self::Regenerate => "regenerate",
            Self::StartServer => "start_server",
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step started and has not finished yet.
    Running,
    /// Step finished successfully.
    Succeeded,
    /// Step failed; the run was aborted.
    Failed,
}

/// Recorded execution of one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    /// Which step ran.
    pub step: Step,
    /// Current or final status.
    pub status: StepStatus,
    /// When the step began.
    pub started_at: DateTime<Utc>,
    /// When the step finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message, present only when `status` is `Failed`.
    pub error: Option<String>,
}

/// Terminal (or in-progress) status of a rebuild run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Steps are still executing.
    Running,
    /// All five steps succeeded.
    Succeeded,
    /// The run aborted at `step`.
    Failed {
        /// Step that failed.
        step: Step,
        /// Failure message of that step.
        reason: String,
    },
}

/// One invocation of the rebuild workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RebuildRun {
    /// Unique run identifier.
    pub id: String,
    /// Repository the run operated on.
    pub repository_path: PathBuf,
    /// Step outcomes in execution order.
    pub steps: Vec<StepOutcome>,
    /// Overall status.
    pub status: RunStatus,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RebuildRun {
    /// Construct a new running rebuild with a generated identifier.
    #[must_use]
    pub fn new(repository_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            repository_path,
            steps: Vec::with_capacity(Step::SEQUENCE.len()),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record that `step` has begun.
    pub fn begin(&mut self, step: Step) {
        self.steps.push(StepOutcome {
            step,
            status: StepStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        });
    }

    /// Mark the most recently begun step as succeeded.
    pub fn succeed(&mut self) {
        if let Some(outcome) = self.steps.last_mut() {
            outcome.status = StepStatus::Succeeded;
            outcome.finished_at = Some(Utc::now());
        }
    }

    /// Mark the most recently begun step as failed and abort the run.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        let now = Utc::now();
        if let Some(outcome) = self.steps.last_mut() {
            outcome.status = StepStatus::Failed;
            outcome.finished_at = Some(now);
            outcome.error = Some(reason.clone());
            self.status = RunStatus::Failed {
                step: outcome.step,
                reason,
            };
        }
        self.finished_at = Some(now);
    }

    /// Mark the run as completed successfully.
    pub fn complete(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Steps that ran, in order.
    #[must_use]
    pub fn executed_steps(&self) -> Vec<Step> {
        self.steps.iter().map(|outcome| outcome.step).collect()
    }

    /// Whether every step succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// The step the run aborted at, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<Step> {
        match self.status {
            RunStatus::Failed { step, .. } => Some(step),
            RunStatus::Running | RunStatus::Succeeded => None,
        }
    }
}
