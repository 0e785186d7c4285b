use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::Result;
use crate::language::LanguageTable;
use crate::llm::{prompt, CompletionClient, GenerationConfig, TextGenerator};
use crate::platform::github::{GitHubAuth, GitHubHost};
use crate::platform::types::CreatePullRequest;
use crate::platform::CodeHost;
use crate::sandbox::{DockerSandbox, ExecutionEnvironment};
use crate::status::{RunStatus, StatusBroadcaster};
use crate::workflow::context::WorkflowContext;
use crate::workflow::state::{StateMachine, WorkflowState};
use crate::workflow::types::{PhaseError, PhaseFailure, RunReport};
use crate::workspace::{GitWorkspaceManager, VersionControl};

type PhaseResult = std::result::Result<WorkflowState, PhaseError>;

/// The external collaborators a run drives.
#[derive(Clone)]
pub struct Capabilities {
    pub llm: Arc<dyn TextGenerator>,
    pub vcs: Arc<dyn VersionControl>,
    pub sandbox: Arc<dyn ExecutionEnvironment>,
    pub host: Arc<dyn CodeHost>,
}

impl Capabilities {
    /// Construct the production collaborators. Fails on missing credentials.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let auth = Arc::new(GitHubAuth::from_config(&config.github)?);

        Ok(Self {
            llm: Arc::new(CompletionClient::new(
                &config.llm.api_url,
                config.llm_api_key(),
            )),
            vcs: Arc::new(GitWorkspaceManager::new(&config.workspace, Arc::clone(&auth))),
            sandbox: Arc::new(DockerSandbox::new(&config.sandbox)?),
            host: Arc::new(GitHubHost::new(&config.github, auth)?),
        })
    }
}

/// Per-deployment knobs for the workflow.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub remote_url: String,
    pub base_branch: String,
    pub branch_prefix: String,
    pub generated_file: String,
    pub test_file: String,
    pub commit_message: String,
    pub fix_commit_message: String,
    pub max_fix_attempts: u32,
    pub review_delay: Duration,
    pub generation: GenerationConfig,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            remote_url: config.github.remote_url(),
            base_branch: config.github.base_branch.clone(),
            branch_prefix: config.agent.branch_prefix.clone(),
            generated_file: config.agent.generated_file.clone(),
            test_file: config.agent.test_file.clone(),
            commit_message: config.agent.commit_message.clone(),
            fix_commit_message: config.agent.fix_commit_message.clone(),
            max_fix_attempts: config.agent.max_fix_attempts,
            review_delay: Duration::from_secs(config.agent.review_delay_secs),
            generation: GenerationConfig::from(&config.llm),
        }
    }

    /// The only paths a run ever commits. Caches and installed runners stay out.
    fn committed_paths(&self) -> [&str; 2] {
        [self.generated_file.as_str(), self.test_file.as_str()]
    }
}

/// Drives runs from STARTING to DONE or ERROR.
///
/// One orchestrator can serve many concurrent runs; each call to [`run`](Self::run)
/// owns its own state machine, context, working copy and environment.
pub struct Orchestrator {
    settings: WorkflowSettings,
    languages: Arc<LanguageTable>,
    caps: Capabilities,
    status: StatusBroadcaster,
}

impl Orchestrator {
    pub fn new(
        settings: WorkflowSettings,
        languages: Arc<LanguageTable>,
        caps: Capabilities,
        status: StatusBroadcaster,
    ) -> Self {
        Self {
            settings,
            languages,
            caps,
            status,
        }
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    /// Execute one run to completion. Never fails: the outcome is in the report.
    pub async fn run(&self, run_id: Uuid, requirement: &str) -> RunReport {
        let status = self.status.for_run(run_id);
        let mut machine = StateMachine::new();
        let mut ctx = WorkflowContext::new();
        let mut failure = None;

        while !machine.get().is_terminal() {
            let state = machine.get();
            let outcome = AssertUnwindSafe(self.step(state, requirement, &mut ctx, &status))
                .catch_unwind()
                .await;

            let next = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(error)) => self.fail(state, error, &status, &mut failure),
                Err(payload) => {
                    let error = PhaseError::Panicked(panic_message(payload.as_ref()));
                    self.fail(state, error, &status, &mut failure)
                }
            };
            machine.set(next);
        }

        // "Complete", not "succeeded": callers read the terminal state.
        status.publish(WorkflowState::Done.as_str(), "Workflow complete");

        let report = RunReport {
            run_id,
            terminal_state: machine.get(),
            fix_attempts: ctx.fix_attempts(),
            branch: ctx.branch().ok().map(str::to_string),
            pull_request: ctx.pull_request().cloned(),
            failure,
        };

        self.teardown(&mut ctx, run_id).await;

        tracing::info!(
            %run_id,
            terminal_state = %report.terminal_state,
            fix_attempts = report.fix_attempts,
            "Run finished"
        );
        report
    }

    fn fail(
        &self,
        state: WorkflowState,
        error: PhaseError,
        status: &RunStatus,
        failure: &mut Option<PhaseFailure>,
    ) -> WorkflowState {
        status.publish(
            WorkflowState::Error.as_str(),
            &format!("{state} failed: {error}"),
        );
        *failure = Some(PhaseFailure { state, error });
        WorkflowState::Error
    }

    async fn step(
        &self,
        state: WorkflowState,
        requirement: &str,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        match state {
            WorkflowState::Starting => {
                status.publish(
                    state.as_str(),
                    &format!("Starting work on: {requirement}"),
                );
                Ok(WorkflowState::Planning)
            }
            WorkflowState::Planning => self.handle_planning(requirement, ctx, status).await,
            WorkflowState::CodeGeneration => self.handle_code_generation(ctx, status).await,
            WorkflowState::Testing => self.handle_testing(ctx, status).await,
            WorkflowState::AwaitingReview => {
                self.handle_awaiting_review(requirement, ctx, status).await
            }
            WorkflowState::Fixing => self.handle_fixing(ctx, status).await,
            WorkflowState::Done | WorkflowState::Error => Ok(state),
        }
    }

    pub(crate) async fn handle_planning(
        &self,
        requirement: &str,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        let phase = WorkflowState::Planning.as_str();

        status.publish(phase, "Cloning repository");
        let workspace = self
            .caps
            .vcs
            .acquire_workspace(&self.settings.remote_url)
            .await?;
        ctx.attach_workspace(workspace);

        let branch = feature_branch_name(&self.settings.branch_prefix);
        self.caps
            .vcs
            .create_branch(ctx.workspace()?, &branch)
            .await?;
        status.publish(phase, &format!("Created branch {branch}"));
        ctx.set_branch(branch)?;

        status.publish(phase, "Generating plan");
        let plan = self
            .caps
            .llm
            .generate(&prompt::planning_prompt(requirement), &self.settings.generation)
            .await?;
        let plan = plan.trim();
        if plan.is_empty() {
            return Err(PhaseError::EmptyGeneration("plan"));
        }
        ctx.set_plan(plan.to_string())?;

        status.publish(phase, "Plan ready");
        Ok(WorkflowState::CodeGeneration)
    }

    pub(crate) async fn handle_code_generation(
        &self,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        let phase = WorkflowState::CodeGeneration.as_str();
        let path = &self.settings.generated_file;
        let plan = ctx.plan()?.to_string();
        let language = self.languages.resolve(path)?;

        status.publish(phase, "Starting isolated environment");
        let environment = self.caps.sandbox.start(ctx.workspace()?).await?;
        ctx.attach_environment(environment);

        status.publish(phase, &format!("Generating {} code", language.display_name));
        let raw = self
            .caps
            .llm
            .generate(
                &prompt::code_generation_prompt(&plan, language, path),
                &self.settings.generation,
            )
            .await?;
        let code = prompt::extract_code(&raw, &language.markdown_tag);
        if code.is_empty() {
            return Err(PhaseError::EmptyGeneration("code"));
        }

        self.caps
            .sandbox
            .write_file(ctx.environment()?, path, &code)
            .await?;
        status.publish(phase, &format!("Wrote {path}"));
        Ok(WorkflowState::Testing)
    }

    pub(crate) async fn handle_testing(
        &self,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        let phase = WorkflowState::Testing.as_str();
        let code_path = &self.settings.generated_file;
        let test_path = &self.settings.test_file;
        let environment = ctx.environment()?;

        let code = self
            .caps
            .sandbox
            .read_file(environment, code_path)
            .await?
            .ok_or(PhaseError::MissingArtifact("generated file"))?;
        let language = self.languages.resolve(code_path)?;

        status.publish(
            phase,
            &format!("Generating {} tests", language.test_framework),
        );
        let raw = self
            .caps
            .llm
            .generate(
                &prompt::test_generation_prompt(&code, language, code_path),
                &self.settings.generation,
            )
            .await?;
        let tests = prompt::extract_code(&raw, &language.markdown_tag);
        if tests.is_empty() {
            return Err(PhaseError::EmptyGeneration("tests"));
        }
        self.caps
            .sandbox
            .write_file(environment, test_path, &tests)
            .await?;

        status.publish(phase, &format!("Running `{}`", language.test_command));
        let result = self
            .caps
            .sandbox
            .run_command(environment, &language.test_command)
            .await?;

        if result.exit_code != 0 {
            return Err(PhaseError::TestsFailed {
                exit_code: result.exit_code,
                output: result.output,
            });
        }

        status.publish(phase, "Tests passed");
        Ok(WorkflowState::AwaitingReview)
    }

    pub(crate) async fn handle_awaiting_review(
        &self,
        requirement: &str,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        let phase = WorkflowState::AwaitingReview.as_str();

        if ctx.pull_request().is_none() {
            let branch = ctx.branch()?.to_string();

            status.publish(phase, &format!("Pushing {branch}"));
            self.caps
                .vcs
                .commit_and_push(
                    ctx.workspace()?,
                    &self.settings.committed_paths(),
                    &self.settings.commit_message,
                    &branch,
                )
                .await?;

            let request = CreatePullRequest {
                title: pull_request_title(requirement),
                body: pull_request_body(requirement, ctx.plan()?),
                head_branch: branch,
                base_branch: self.settings.base_branch.clone(),
            };
            let pr = self.caps.host.create_pull_request(&request).await?;
            status.publish(
                phase,
                &format!("Opened pull request #{}: {}", pr.id, pr.url),
            );
            ctx.set_pull_request(pr)?;
        }

        let pr_id = ctx
            .pull_request()
            .map(|pr| pr.id)
            .ok_or(PhaseError::MissingArtifact("pull request"))?;

        if !self.settings.review_delay.is_zero() {
            status.publish(
                phase,
                &format!(
                    "Waiting {}s for review on #{pr_id}",
                    self.settings.review_delay.as_secs()
                ),
            );
            tokio::time::sleep(self.settings.review_delay).await;
        }

        let comments = self.caps.host.get_review_comments(pr_id).await?;
        if comments.is_empty() {
            status.publish(phase, "No review comments");
            return Ok(WorkflowState::Done);
        }

        status.publish(
            phase,
            &format!("Received {} review comment(s)", comments.len()),
        );
        ctx.set_review_feedback(comments);
        Ok(WorkflowState::Fixing)
    }

    pub(crate) async fn handle_fixing(
        &self,
        ctx: &mut WorkflowContext,
        status: &RunStatus,
    ) -> PhaseResult {
        let phase = WorkflowState::Fixing.as_str();
        let max = self.settings.max_fix_attempts;

        // Bounds FIXING -> AWAITING_REVIEW -> FIXING to `max` cycles.
        if ctx.fix_attempts() >= max {
            return Err(PhaseError::FixBudgetExhausted { max });
        }
        if ctx.review_feedback().is_empty() {
            return Err(PhaseError::MissingArtifact("review feedback"));
        }

        let attempt = ctx.begin_fix_attempt();
        status.publish(phase, &format!("Fix attempt {attempt} of {max}"));

        let path = &self.settings.generated_file;
        let environment = ctx.environment()?;
        let code = self
            .caps
            .sandbox
            .read_file(environment, path)
            .await?
            .ok_or(PhaseError::MissingArtifact("generated file"))?;
        let language = self.languages.resolve(path)?;

        let feedback =
            prompt::feedback_block(ctx.review_feedback().iter().map(|c| c.body.as_str()));
        let raw = self
            .caps
            .llm
            .generate(
                &prompt::fix_prompt(&code, language, &feedback),
                &self.settings.generation,
            )
            .await?;
        let fixed = prompt::extract_code(&raw, &language.markdown_tag);
        if fixed.is_empty() {
            return Err(PhaseError::EmptyGeneration("fix"));
        }

        self.caps
            .sandbox
            .write_file(environment, path, &fixed)
            .await?;

        let message = self
            .settings
            .fix_commit_message
            .replace("{attempt}", &attempt.to_string());
        self.caps
            .vcs
            .commit_and_push(
                ctx.workspace()?,
                &self.settings.committed_paths(),
                &message,
                ctx.branch()?,
            )
            .await?;

        ctx.clear_review_feedback();
        status.publish(phase, &format!("Pushed fix attempt {attempt}"));
        Ok(WorkflowState::AwaitingReview)
    }

    /// Release what the run acquired. Failures are logged; the outcome is already fixed.
    async fn teardown(&self, ctx: &mut WorkflowContext, run_id: Uuid) {
        if let Some(environment) = ctx.take_environment() {
            if let Err(e) = self.caps.sandbox.stop_and_remove(environment).await {
                tracing::warn!(%run_id, error = %e, "Failed to remove execution environment");
            }
        }

        if let Some(workspace) = ctx.take_workspace() {
            if let Err(e) = self.caps.vcs.release(workspace).await {
                tracing::warn!(%run_id, error = %e, "Failed to release workspace");
            }
        }
    }
}

/// `<prefix><6 random hex digits>`.
pub fn feature_branch_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &suffix[..6])
}

fn pull_request_title(requirement: &str) -> String {
    let first_line = requirement.lines().next().unwrap_or("").trim();
    let title: String = first_line.chars().take(72).collect();
    if title.len() < first_line.len() {
        format!("Momentum: {title}…")
    } else {
        format!("Momentum: {title}")
    }
}

fn pull_request_body(requirement: &str, plan: &str) -> String {
    format!(
        "## Requirement\n\n{requirement}\n\n## Plan\n\n{plan}\n\n---\n*Automated by Momentum*"
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
