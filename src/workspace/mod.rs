pub mod git;
pub mod manager;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

pub use manager::GitWorkspaceManager;

/// A checked-out working copy owned by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    pub path: PathBuf,
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `remote_url` into a fresh working copy.
    async fn acquire_workspace(&self, remote_url: &str) -> Result<WorkspaceHandle>;

    /// Create `name` from the current HEAD and check it out.
    async fn create_branch(&self, workspace: &WorkspaceHandle, name: &str) -> Result<()>;

    /// Stage exactly `paths` (relative to the working copy), commit them with `message`
    /// and push `branch` to origin. Nothing else in the working copy is committed.
    async fn commit_and_push(
        &self,
        workspace: &WorkspaceHandle,
        paths: &[&str],
        message: &str,
        branch: &str,
    ) -> Result<()>;

    /// Delete the working copy.
    async fn release(&self, workspace: WorkspaceHandle) -> Result<()>;
}
