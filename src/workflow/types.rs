use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::platform::types::PullRequestHandle;
use crate::workflow::state::WorkflowState;

/// Why a phase handler could not advance the workflow.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Capability(#[from] AppError),

    #[error("text generation returned no {0}")]
    EmptyGeneration(&'static str),

    /// `output` holds the exact bytes the test command wrote; only `Display` decodes it.
    #[error("tests failed with exit code {exit_code}:\n{}", String::from_utf8_lossy(.output))]
    TestsFailed { exit_code: i64, output: Vec<u8> },

    #[error("maximum fix attempts reached ({max})")]
    FixBudgetExhausted { max: u32 },

    #[error("{0} is not available")]
    MissingArtifact(&'static str),

    #[error("no language profile for `{0}`")]
    UnknownLanguage(String),

    #[error("{0} is already set")]
    AlreadySet(&'static str),

    #[error("phase panicked: {0}")]
    Panicked(String),
}

/// The phase that failed and why.
#[derive(Debug)]
pub struct PhaseFailure {
    pub state: WorkflowState,
    pub error: PhaseError,
}

/// What a finished run looked like, captured before teardown.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub terminal_state: WorkflowState,
    pub fix_attempts: u32,
    pub branch: Option<String>,
    pub pull_request: Option<PullRequestHandle>,
    pub failure: Option<PhaseFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.terminal_state == WorkflowState::Done
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            terminal_state: self.terminal_state,
            fix_attempts: self.fix_attempts,
            branch: self.branch.clone(),
            pull_request: self.pull_request.clone(),
            failed_state: self.failure.as_ref().map(|f| f.state),
            failure: self.failure.as_ref().map(|f| f.error.to_string()),
        }
    }
}

/// Serializable view of a [`RunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub terminal_state: WorkflowState,
    pub fix_attempts: u32,
    pub branch: Option<String>,
    pub pull_request: Option<PullRequestHandle>,
    pub failed_state: Option<WorkflowState>,
    pub failure: Option<String>,
}
