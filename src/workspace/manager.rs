use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::platform::github::GitHubAuth;
use crate::workspace::{git, VersionControl, WorkspaceHandle};

/// Clones working copies under a base directory and drives them with git2.
pub struct GitWorkspaceManager {
    base_dir: PathBuf,
    auth: Arc<GitHubAuth>,
}

impl GitWorkspaceManager {
    pub fn new(config: &WorkspaceConfig, auth: Arc<GitHubAuth>) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            auth,
        }
    }

    /// Clean up an existing workspace directory and ensure its parent exists.
    async fn prepare_workspace_dir(path: &Path) -> Result<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to clean workspace: {e}")))?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;
        }
        Ok(())
    }

    /// Each acquisition gets its own directory so concurrent runs never share one.
    fn fresh_workspace_path(&self) -> PathBuf {
        self.base_dir.join(format!("run-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl VersionControl for GitWorkspaceManager {
    async fn acquire_workspace(&self, remote_url: &str) -> Result<WorkspaceHandle> {
        let path = self.fresh_workspace_path();
        Self::prepare_workspace_dir(&path).await?;

        let token = self.auth.access_token().await?;
        tracing::info!(path = %path.display(), "Cloning repository");
        if let Err(e) = git::clone(remote_url, &path, &token).await {
            // Don't leave a half-written clone behind.
            let _ = tokio::fs::remove_dir_all(&path).await;
            return Err(e);
        }

        Ok(WorkspaceHandle { path })
    }

    async fn create_branch(&self, workspace: &WorkspaceHandle, name: &str) -> Result<()> {
        tracing::info!(branch = name, "Creating branch");
        git::create_branch(&workspace.path, name).await
    }

    async fn commit_and_push(
        &self,
        workspace: &WorkspaceHandle,
        paths: &[&str],
        message: &str,
        branch: &str,
    ) -> Result<()> {
        git::add_paths(&workspace.path, paths).await?;
        if git::has_staged_changes(&workspace.path).await? {
            git::commit(&workspace.path, message).await?;
        } else {
            tracing::info!(branch, "No changes to commit");
        }

        let token = self.auth.access_token().await?;
        git::push(&workspace.path, branch, &token).await
    }

    async fn release(&self, workspace: WorkspaceHandle) -> Result<()> {
        if workspace.path.exists() {
            tokio::fs::remove_dir_all(&workspace.path)
                .await
                .map_err(|e| AppError::Workspace(format!("Failed to cleanup workspace: {e}")))?;
        }
        Ok(())
    }
}
