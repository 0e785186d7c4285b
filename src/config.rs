use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::language::LanguageProfile;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default = "default_languages")]
    pub languages: HashMap<String, LanguageProfile>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// Target repository as `owner/repo`.
    pub repository: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Clone URL; derived from `repository` when unset.
    pub remote_url: Option<String>,
    /// Personal access token. Takes precedence over App credentials.
    pub token: Option<String>,
    pub app_id: Option<u64>,
    pub private_key_path: Option<PathBuf>,
    pub installation_id: Option<u64>,
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("repository", &self.repository)
            .field("base_branch", &self.base_branch)
            .field("remote_url", &self.remote_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("app_id", &self.app_id)
            .field("private_key_path", &self.private_key_path)
            .field("installation_id", &self.installation_id)
            .finish()
    }
}

impl GitHubConfig {
    pub fn remote_url(&self) -> String {
        self.remote_url
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{}.git", self.repository))
    }
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default = "default_image")]
    pub image: String,
    /// Mount point of the working copy inside the container.
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            workdir: default_workdir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Path of the generated source file, relative to the working copy.
    #[serde(default = "default_generated_file")]
    pub generated_file: String,
    /// Path of the generated test file, relative to the working copy.
    #[serde(default = "default_test_file")]
    pub test_file: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    /// `{attempt}` is replaced with the fix attempt number.
    #[serde(default = "default_fix_commit_message")]
    pub fix_commit_message: String,
    /// Delay before each review poll, giving automated reviewers time to comment.
    #[serde(default = "default_review_delay")]
    pub review_delay_secs: u64,
    #[serde(default = "default_status_buffer")]
    pub status_buffer: usize,
    /// Finished runs kept for `GET /agent/runs/:id`; older ones are forgotten.
    #[serde(default = "default_finished_run_retention")]
    pub finished_run_retention: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: default_max_fix_attempts(),
            branch_prefix: default_branch_prefix(),
            generated_file: default_generated_file(),
            test_file: default_test_file(),
            commit_message: default_commit_message(),
            fix_commit_message: default_fix_commit_message(),
            review_delay_secs: default_review_delay(),
            status_buffer: default_status_buffer(),
            finished_run_retention: default_finished_run_retention(),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct SlackConfig {
    /// Slash commands are rejected when unset.
    pub signing_secret: Option<String>,
}

// Manual Debug impl to avoid leaking the signing secret
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_model() -> String {
    "llama-4-maverick-17b-128e-instruct".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.5
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/momentum-workspaces")
}

fn default_image() -> String {
    "python:3.10-slim".to_string()
}

fn default_workdir() -> String {
    "/workspace".to_string()
}

fn default_max_fix_attempts() -> u32 {
    3
}

fn default_branch_prefix() -> String {
    "momentum/feature-".to_string()
}

fn default_generated_file() -> String {
    "src/main.py".to_string()
}

fn default_test_file() -> String {
    "tests/test_main.py".to_string()
}

fn default_commit_message() -> String {
    "feat: implement requirement (automated by Momentum)".to_string()
}

fn default_fix_commit_message() -> String {
    "fix: address review feedback (attempt {attempt})".to_string()
}

fn default_review_delay() -> u64 {
    30
}

fn default_status_buffer() -> usize {
    256
}

fn default_finished_run_retention() -> usize {
    1000
}

/// Test commands install their runner first: the stock language images ship without one.
/// Only `py` matches the default `python:3.10-slim` image; the others need `sandbox.image`
/// pointed at a node, rust or golang image.
const DEFAULT_LANGUAGES: &str = r#"
[py]
display_name = "Python"
test_framework = "pytest"
test_command = "python -m pip install -q --disable-pip-version-check pytest && python -m pytest -q"
markdown_tag = "python"

[js]
display_name = "JavaScript"
test_framework = "jest"
test_command = "npm install --no-save --silent jest && npx jest"
markdown_tag = "javascript"

[ts]
display_name = "TypeScript"
test_framework = "jest"
test_command = "npm install --no-save --silent jest ts-jest typescript && npx jest --preset=ts-jest"
markdown_tag = "typescript"

[rs]
display_name = "Rust"
test_framework = "cargo test"
test_command = "cargo test"
markdown_tag = "rust"

[go]
display_name = "Go"
test_framework = "go test"
test_command = "go test ./..."
markdown_tag = "go"
"#;

pub fn default_languages() -> HashMap<String, LanguageProfile> {
    // The embedded table is a compile-time constant covered by tests.
    toml::from_str(DEFAULT_LANGUAGES).unwrap_or_default()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("momentum").required(false));
        }

        // Environment variable overrides with MOMENTUM_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("MOMENTUM")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check that every capability the workflow needs can be constructed.
    pub fn validate(&self) -> Result<()> {
        if self.github.repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(AppError::Config(format!(
                "github.repository must be `owner/repo`, got `{}`",
                self.github.repository
            )));
        }

        let has_token = self.github.token.as_ref().is_some_and(|t| !t.is_empty());
        let has_app = self.github.app_id.is_some()
            && self.github.private_key_path.is_some()
            && self.github.installation_id.is_some();
        if !has_token && !has_app {
            return Err(AppError::Config(
                "GitHub credentials missing: set github.token or github.app_id, \
                 github.private_key_path and github.installation_id"
                    .to_string(),
            ));
        }

        if self.llm.api_url.is_empty() || self.llm.api_key.is_empty() {
            return Err(AppError::Config(
                "llm.api_url and llm.api_key must be set".to_string(),
            ));
        }

        if !self.agent.fix_commit_message.contains("{attempt}") {
            tracing::warn!("agent.fix_commit_message has no {{attempt}} placeholder");
        }

        if self.languages.is_empty() {
            return Err(AppError::Config("languages table is empty".to_string()));
        }

        if self.agent.finished_run_retention == 0 {
            return Err(AppError::Config(
                "agent.finished_run_retention must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn llm_api_key(&self) -> &str {
        &self.llm.api_key
    }
}
