use std::path::{Component, Path};

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::StartExecResults;
use bollard::models::{ContainerCreateBody, ExecConfig, HostConfig};
use bollard::query_parameters::{CreateImageOptionsBuilder, RemoveContainerOptionsBuilder};
use bollard::Docker;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::config::SandboxConfig;
use crate::error::{AppError, Result};
use crate::sandbox::{CommandOutput, EnvironmentHandle, ExecutionEnvironment};
use crate::workspace::WorkspaceHandle;

/// Writes `$1` from stdin, creating parent directories.
const WRITE_SCRIPT: &str = r#"mkdir -p "$(dirname "$1")" && cat > "$1""#;

/// Runs containers through the Docker Engine API.
///
/// The working copy is bind-mounted at `workdir`, so files written in the
/// container show up in the working copy for version control.
pub struct DockerSandbox {
    docker: Docker,
    image: String,
    workdir: String,
}

/// Which streams of an exec to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// stdout and stderr, in arrival order.
    Combined,
    StdoutOnly,
}

struct ExecOutput {
    exit_code: i64,
    output: Vec<u8>,
}

impl DockerSandbox {
    /// Connect to the local daemon (`DOCKER_HOST` or the default socket).
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| AppError::Sandbox(format!("Failed to connect to Docker: {e}")))?;
        Ok(Self {
            docker,
            image: config.image.clone(),
            workdir: config.workdir.clone(),
        })
    }

    fn container_body(&self, workspace: &Path) -> ContainerCreateBody {
        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(self.workdir.clone()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:{}", workspace.display(), self.workdir)]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn exec_config(&self, cmd: Vec<String>, stdin: bool) -> ExecConfig {
        ExecConfig {
            cmd: Some(cmd),
            working_dir: Some(self.workdir.clone()),
            attach_stdin: Some(stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }

    /// Pull the image unless the daemon already has it.
    async fn ensure_image(&self) -> Result<()> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image = %self.image, "Pulling sandbox image");
        let options = CreateImageOptionsBuilder::default()
            .from_image(&self.image)
            .build();
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|e| AppError::Sandbox(format!("Failed to pull {}: {e}", self.image)))?;
        }
        Ok(())
    }

    /// Run `cmd` in the container, optionally feeding `stdin`, and wait for it to exit.
    async fn exec(
        &self,
        env: &EnvironmentHandle,
        cmd: Vec<String>,
        stdin: Option<&[u8]>,
        capture: Capture,
    ) -> Result<ExecOutput> {
        let created = self
            .docker
            .create_exec(&env.id, self.exec_config(cmd, stdin.is_some()))
            .await?;

        let mut collected = Vec::new();
        let started = self
            .docker
            .start_exec(&created.id, None::<bollard::exec::StartExecOptions>)
            .await?;
        match started {
            StartExecResults::Attached { mut output, mut input } => {
                if let Some(bytes) = stdin {
                    input.write_all(bytes).await?;
                    input.shutdown().await?;
                }
                drop(input);

                while let Some(chunk) = output.next().await {
                    match chunk? {
                        LogOutput::StdErr { message } if capture == Capture::StdoutOnly => {
                            tracing::debug!(
                                container = %env.id,
                                stderr = %String::from_utf8_lossy(&message).trim(),
                                "Exec stderr"
                            );
                        }
                        other => collected.extend_from_slice(&other.into_bytes()),
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(AppError::Sandbox(
                    "Exec started detached; no output to collect".to_string(),
                ));
            }
        }

        let inspected = self.docker.inspect_exec(&created.id).await?;
        Ok(ExecOutput {
            exit_code: inspected.exit_code.unwrap_or(-1),
            output: collected,
        })
    }
}

fn shell(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

fn write_command(path: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        WRITE_SCRIPT.to_string(),
        "sh".to_string(),
        path.to_string(),
    ]
}

/// Only plain relative paths may be touched inside the container.
fn validate_relative_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    if path.is_empty() || p.is_absolute() {
        return Err(AppError::Sandbox(format!(
            "Path must be relative to the workspace: {path}"
        )));
    }
    if p
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(AppError::Sandbox(format!(
            "Path traversal detected: {path} is outside workspace"
        )));
    }
    Ok(())
}

#[async_trait]
impl ExecutionEnvironment for DockerSandbox {
    async fn start(&self, workspace: &WorkspaceHandle) -> Result<EnvironmentHandle> {
        self.ensure_image().await?;

        let created = self
            .docker
            .create_container(
                None::<bollard::query_parameters::CreateContainerOptions>,
                self.container_body(&workspace.path),
            )
            .await
            .map_err(|e| AppError::Sandbox(format!("Failed to create container: {e}")))?;

        for warning in &created.warnings {
            tracing::warn!(container = %created.id, warning = %warning, "Docker warning");
        }

        let env = EnvironmentHandle { id: created.id };
        if let Err(e) = self
            .docker
            .start_container(
                &env.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            // Not handed out yet, so nobody else will remove it.
            if let Err(cleanup) = self.stop_and_remove(env.clone()).await {
                tracing::warn!(container = %env.id, error = %cleanup, "Failed to remove unstarted container");
            }
            return Err(AppError::Sandbox(format!("Failed to start container: {e}")));
        }

        tracing::info!(container = %env.id, image = %self.image, "Sandbox started");
        Ok(env)
    }

    async fn write_file(&self, env: &EnvironmentHandle, path: &str, content: &str) -> Result<()> {
        validate_relative_path(path)?;

        let result = self
            .exec(env, write_command(path), Some(content.as_bytes()), Capture::Combined)
            .await?;
        if result.exit_code != 0 {
            return Err(AppError::Sandbox(format!(
                "Failed to write {path}: {}",
                String::from_utf8_lossy(&result.output).trim()
            )));
        }

        tracing::debug!(container = %env.id, path, bytes = content.len(), "Wrote file");
        Ok(())
    }

    async fn read_file(&self, env: &EnvironmentHandle, path: &str) -> Result<Option<String>> {
        validate_relative_path(path)?;

        let cmd = vec!["cat".to_string(), "--".to_string(), path.to_string()];
        let result = self.exec(env, cmd, None, Capture::StdoutOnly).await?;
        if result.exit_code != 0 {
            tracing::debug!(container = %env.id, path, exit_code = result.exit_code, "File not readable");
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&result.output).into_owned()))
    }

    async fn run_command(&self, env: &EnvironmentHandle, command: &str) -> Result<CommandOutput> {
        tracing::info!(container = %env.id, command, "Running command");
        let result = self.exec(env, shell(command), None, Capture::Combined).await?;

        Ok(CommandOutput {
            exit_code: result.exit_code,
            output: result.output,
        })
    }

    async fn stop_and_remove(&self, env: EnvironmentHandle) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        self.docker
            .remove_container(&env.id, Some(options))
            .await
            .map_err(|e| {
                AppError::Sandbox(format!("Failed to remove container {}: {e}", env.id))
            })?;
        tracing::info!(container = %env.id, "Sandbox removed");
        Ok(())
    }
}
