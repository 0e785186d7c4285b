use crate::platform::types::{PullRequestHandle, ReviewComment};
use crate::sandbox::EnvironmentHandle;
use crate::workflow::types::PhaseError;
use crate::workspace::WorkspaceHandle;

/// Artifacts accumulated by one run.
///
/// Fields are filled in phase order and never erased, except review feedback,
/// which FIXING consumes. The workspace and environment are taken back out
/// only by teardown.
#[derive(Debug, Default)]
pub struct WorkflowContext {
    workspace: Option<WorkspaceHandle>,
    environment: Option<EnvironmentHandle>,
    plan: Option<String>,
    branch: Option<String>,
    pull_request: Option<PullRequestHandle>,
    review_feedback: Vec<ReviewComment>,
    fix_attempts: u32,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace(&self) -> Result<&WorkspaceHandle, PhaseError> {
        self.workspace
            .as_ref()
            .ok_or(PhaseError::MissingArtifact("workspace"))
    }

    pub fn attach_workspace(&mut self, workspace: WorkspaceHandle) {
        self.workspace = Some(workspace);
    }

    pub fn environment(&self) -> Result<&EnvironmentHandle, PhaseError> {
        self.environment
            .as_ref()
            .ok_or(PhaseError::MissingArtifact("execution environment"))
    }

    pub fn attach_environment(&mut self, environment: EnvironmentHandle) {
        self.environment = Some(environment);
    }

    pub fn plan(&self) -> Result<&str, PhaseError> {
        self.plan
            .as_deref()
            .ok_or(PhaseError::MissingArtifact("plan"))
    }

    pub fn set_plan(&mut self, plan: String) -> Result<(), PhaseError> {
        if self.plan.is_some() {
            return Err(PhaseError::AlreadySet("plan"));
        }
        self.plan = Some(plan);
        Ok(())
    }

    pub fn branch(&self) -> Result<&str, PhaseError> {
        self.branch
            .as_deref()
            .ok_or(PhaseError::MissingArtifact("feature branch"))
    }

    pub fn set_branch(&mut self, branch: String) -> Result<(), PhaseError> {
        if self.branch.is_some() {
            return Err(PhaseError::AlreadySet("feature branch"));
        }
        self.branch = Some(branch);
        Ok(())
    }

    /// Present once a pull request has been opened; its presence blocks re-creation.
    pub fn pull_request(&self) -> Option<&PullRequestHandle> {
        self.pull_request.as_ref()
    }

    pub fn set_pull_request(&mut self, pr: PullRequestHandle) -> Result<(), PhaseError> {
        if self.pull_request.is_some() {
            return Err(PhaseError::AlreadySet("pull request"));
        }
        self.pull_request = Some(pr);
        Ok(())
    }

    pub fn review_feedback(&self) -> &[ReviewComment] {
        &self.review_feedback
    }

    pub fn set_review_feedback(&mut self, comments: Vec<ReviewComment>) {
        self.review_feedback = comments;
    }

    pub fn clear_review_feedback(&mut self) {
        self.review_feedback.clear();
    }

    pub fn fix_attempts(&self) -> u32 {
        self.fix_attempts
    }

    /// Count a new fix attempt and return its 1-based number.
    pub fn begin_fix_attempt(&mut self) -> u32 {
        self.fix_attempts += 1;
        self.fix_attempts
    }

    pub fn take_environment(&mut self) -> Option<EnvironmentHandle> {
        self.environment.take()
    }

    pub fn take_workspace(&mut self) -> Option<WorkspaceHandle> {
        self.workspace.take()
    }
}
