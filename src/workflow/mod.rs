pub mod context;
pub mod orchestrator;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod tests;

pub use orchestrator::{Capabilities, Orchestrator, WorkflowSettings};
pub use state::{StateMachine, WorkflowState};
pub use types::{PhaseError, RunReport, RunSummary};
