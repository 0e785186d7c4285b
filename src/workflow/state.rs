use std::fmt;

use serde::{Deserialize, Serialize};

/// Phases of a run, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Starting,
    Planning,
    CodeGeneration,
    Testing,
    AwaitingReview,
    Fixing,
    Done,
    Error,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 8] = [
        WorkflowState::Starting,
        WorkflowState::Planning,
        WorkflowState::CodeGeneration,
        WorkflowState::Testing,
        WorkflowState::AwaitingReview,
        WorkflowState::Fixing,
        WorkflowState::Done,
        WorkflowState::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Starting => "STARTING",
            WorkflowState::Planning => "PLANNING",
            WorkflowState::CodeGeneration => "CODE_GENERATION",
            WorkflowState::Testing => "TESTING",
            WorkflowState::AwaitingReview => "AWAITING_REVIEW",
            WorkflowState::Fixing => "FIXING",
            WorkflowState::Done => "DONE",
            WorkflowState::Error => "ERROR",
        }
    }

    /// `Done` and `Error` have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Error)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the current phase of one run.
///
/// Passive: it does not validate transitions. The orchestrator decides the
/// next state next to the side effects that justify it.
#[derive(Debug)]
pub struct StateMachine {
    current: WorkflowState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: WorkflowState::Starting,
        }
    }

    pub fn get(&self) -> WorkflowState {
        self.current
    }

    pub fn set(&mut self, next: WorkflowState) {
        tracing::debug!(from = %self.current, to = %next, "State transition");
        self.current = next;
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
