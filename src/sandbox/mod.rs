pub mod docker;

use async_trait::async_trait;

use crate::error::Result;
use crate::workspace::WorkspaceHandle;

pub use docker::DockerSandbox;

/// A running isolated environment owned by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    pub id: String,
}

/// Result of a command executed inside the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub output: Vec<u8>,
}

#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Start an environment rooted at the working copy.
    async fn start(&self, workspace: &WorkspaceHandle) -> Result<EnvironmentHandle>;

    /// Write `content` to `path`, relative to the working-copy root.
    async fn write_file(&self, env: &EnvironmentHandle, path: &str, content: &str) -> Result<()>;

    /// Read `path`, or `None` if it does not exist or cannot be read.
    async fn read_file(&self, env: &EnvironmentHandle, path: &str) -> Result<Option<String>>;

    /// Run a shell command from the working-copy root.
    async fn run_command(&self, env: &EnvironmentHandle, command: &str) -> Result<CommandOutput>;

    async fn stop_and_remove(&self, env: EnvironmentHandle) -> Result<()>;
}
