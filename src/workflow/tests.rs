use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::default_languages;
use crate::error::{AppError, Result};
use crate::language::LanguageTable;
use crate::llm::{GenerationConfig, TextGenerator};
use crate::platform::types::{CreatePullRequest, PullRequestHandle, ReviewComment};
use crate::platform::CodeHost;
use crate::sandbox::{CommandOutput, EnvironmentHandle, ExecutionEnvironment};
use crate::status::{StatusBroadcaster, StatusEvent};
use crate::workflow::context::WorkflowContext;
use crate::workflow::orchestrator::{feature_branch_name, Capabilities, Orchestrator, WorkflowSettings};
use crate::workflow::state::WorkflowState;
use crate::workflow::types::PhaseError;
use crate::workspace::{VersionControl, WorkspaceHandle};

const CODE_PATH: &str = "src/main.py";
const TEST_PATH: &str = "tests/test_main.py";

type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Stage {
    Plan,
    Code,
    Tests,
    Fix,
}

impl Stage {
    fn of(prompt: &str) -> Stage {
        if prompt.contains("step-by-step plan") {
            Stage::Plan
        } else if prompt.contains("Implement the following plan") {
            Stage::Code
        } else if prompt.contains("reviewer left feedback") {
            Stage::Fix
        } else {
            Stage::Tests
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
    Panic,
}

struct FakeLlm {
    replies: Mutex<HashMap<Stage, Reply>>,
    prompts: Mutex<Vec<(Stage, String)>>,
}

impl FakeLlm {
    fn new() -> Self {
        let replies = HashMap::from([
            (Stage::Plan, Reply::Text("1. Add a /health route".to_string())),
            (
                Stage::Code,
                Reply::Text("```python\ndef health():\n    return 'ok'\n```".to_string()),
            ),
            (
                Stage::Tests,
                Reply::Text(
                    "```python\nfrom src.main import health\n\ndef test_health():\n    assert health() == 'ok'\n```"
                        .to_string(),
                ),
            ),
            (
                Stage::Fix,
                Reply::Text("```python\ndef health() -> str:\n    return 'ok'\n```".to_string()),
            ),
        ]);
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn reply(&self, stage: Stage, reply: Reply) {
        self.replies.lock().unwrap().insert(stage, reply);
    }

    fn prompts_for(&self, stage: Stage) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl TextGenerator for FakeLlm {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        let stage = Stage::of(prompt);
        self.prompts.lock().unwrap().push((stage, prompt.to_string()));
        let reply = self.replies.lock().unwrap().get(&stage).cloned();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(AppError::Llm("upstream unavailable".to_string())),
            Some(Reply::Panic) => panic!("generator exploded"),
            None => Ok(String::new()),
        }
    }
}

struct FakeVcs {
    log: CallLog,
    fail_clone: bool,
    commits: Mutex<Vec<String>>,
    staged: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn acquire_workspace(&self, remote_url: &str) -> Result<WorkspaceHandle> {
        record(&self.log, "acquire");
        if self.fail_clone {
            return Err(AppError::Git(format!("failed to clone {remote_url}")));
        }
        Ok(WorkspaceHandle {
            path: PathBuf::from("/tmp/fake-workspace"),
        })
    }

    async fn create_branch(&self, _workspace: &WorkspaceHandle, name: &str) -> Result<()> {
        record(&self.log, format!("branch:{name}"));
        Ok(())
    }

    async fn commit_and_push(
        &self,
        _workspace: &WorkspaceHandle,
        paths: &[&str],
        message: &str,
        branch: &str,
    ) -> Result<()> {
        record(&self.log, format!("push:{branch}"));
        self.commits.lock().unwrap().push(message.to_string());
        self.staged
            .lock()
            .unwrap()
            .push(paths.iter().map(|p| p.to_string()).collect());
        Ok(())
    }

    async fn release(&self, _workspace: WorkspaceHandle) -> Result<()> {
        record(&self.log, "release");
        Ok(())
    }
}

struct FakeSandbox {
    log: CallLog,
    files: Mutex<HashMap<String, String>>,
    exit_code: i64,
    output: Vec<u8>,
}

#[async_trait]
impl ExecutionEnvironment for FakeSandbox {
    async fn start(&self, _workspace: &WorkspaceHandle) -> Result<EnvironmentHandle> {
        record(&self.log, "start");
        Ok(EnvironmentHandle {
            id: "fake-container".to_string(),
        })
    }

    async fn write_file(&self, _env: &EnvironmentHandle, path: &str, content: &str) -> Result<()> {
        record(&self.log, format!("write:{path}"));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, _env: &EnvironmentHandle, path: &str) -> Result<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn run_command(&self, _env: &EnvironmentHandle, command: &str) -> Result<CommandOutput> {
        record(&self.log, format!("run:{command}"));
        Ok(CommandOutput {
            exit_code: self.exit_code,
            output: self.output.clone(),
        })
    }

    async fn stop_and_remove(&self, _env: EnvironmentHandle) -> Result<()> {
        record(&self.log, "stop");
        Ok(())
    }
}

/// Serves queued comment batches, then repeats `fallback` forever.
struct FakeHost {
    log: CallLog,
    batches: Mutex<VecDeque<Vec<ReviewComment>>>,
    fallback: Vec<ReviewComment>,
    created: Mutex<Vec<CreatePullRequest>>,
}

#[async_trait]
impl CodeHost for FakeHost {
    async fn create_pull_request(&self, pr: &CreatePullRequest) -> Result<PullRequestHandle> {
        record(&self.log, "create_pr");
        self.created.lock().unwrap().push(pr.clone());
        Ok(PullRequestHandle {
            id: 42,
            url: "https://github.com/acme/widgets/pull/42".to_string(),
        })
    }

    async fn get_review_comments(&self, pr_id: u64) -> Result<Vec<ReviewComment>> {
        record(&self.log, format!("comments:{pr_id}"));
        let next = self.batches.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

fn comment(body: &str) -> ReviewComment {
    ReviewComment {
        author: Some("reviewer-bot".to_string()),
        body: body.to_string(),
    }
}

pub(crate) struct Harness {
    log: CallLog,
    llm: Arc<FakeLlm>,
    vcs: Arc<FakeVcs>,
    sandbox: Arc<FakeSandbox>,
    host: Arc<FakeHost>,
    pub(crate) status: StatusBroadcaster,
    max_fix_attempts: u32,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let log: CallLog = Arc::default();
        Self {
            llm: Arc::new(FakeLlm::new()),
            vcs: Arc::new(FakeVcs {
                log: Arc::clone(&log),
                fail_clone: false,
                commits: Mutex::new(Vec::new()),
                staged: Mutex::new(Vec::new()),
            }),
            sandbox: Arc::new(FakeSandbox {
                log: Arc::clone(&log),
                files: Mutex::new(HashMap::new()),
                exit_code: 0,
                output: b"1 passed in 0.01s\n".to_vec(),
            }),
            host: Arc::new(FakeHost {
                log: Arc::clone(&log),
                batches: Mutex::new(VecDeque::new()),
                fallback: Vec::new(),
                created: Mutex::new(Vec::new()),
            }),
            status: StatusBroadcaster::new(512),
            max_fix_attempts: 3,
            log,
        }
    }

    fn with_review_batches(
        mut self,
        batches: Vec<Vec<ReviewComment>>,
        fallback: Vec<ReviewComment>,
    ) -> Self {
        self.host = Arc::new(FakeHost {
            log: Arc::clone(&self.log),
            batches: Mutex::new(batches.into()),
            fallback,
            created: Mutex::new(Vec::new()),
        });
        self
    }

    pub(crate) fn with_test_result(mut self, exit_code: i64, output: &[u8]) -> Self {
        self.sandbox = Arc::new(FakeSandbox {
            log: Arc::clone(&self.log),
            files: Mutex::new(HashMap::new()),
            exit_code,
            output: output.to_vec(),
        });
        self
    }

    fn with_failing_clone(mut self) -> Self {
        self.vcs = Arc::new(FakeVcs {
            log: Arc::clone(&self.log),
            fail_clone: true,
            commits: Mutex::new(Vec::new()),
            staged: Mutex::new(Vec::new()),
        });
        self
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator {
        let settings = WorkflowSettings {
            remote_url: "https://github.com/acme/widgets.git".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "momentum/feature-".to_string(),
            generated_file: CODE_PATH.to_string(),
            test_file: TEST_PATH.to_string(),
            commit_message: "feat: implement requirement".to_string(),
            fix_commit_message: "fix: address review feedback (attempt {attempt})".to_string(),
            max_fix_attempts: self.max_fix_attempts,
            review_delay: Duration::ZERO,
            generation: GenerationConfig {
                model: "test-model".to_string(),
                max_tokens: 64,
                temperature: 0.0,
                timeout: Duration::from_secs(1),
            },
        };
        Orchestrator::new(
            settings,
            Arc::new(LanguageTable::new(default_languages())),
            self.capabilities(),
            self.status.clone(),
        )
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        Capabilities {
            llm: self.llm.clone(),
            vcs: self.vcs.clone(),
            sandbox: self.sandbox.clone(),
            host: self.host.clone(),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub(crate) fn pr_creations(&self) -> usize {
        self.host.created.lock().unwrap().len()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_happy_path_ends_done_with_one_pull_request() {
    let h = Harness::new();
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Done);
    assert!(report.succeeded());
    assert!(report.failure.is_none());
    assert_eq!(report.fix_attempts, 0);
    assert_eq!(h.pr_creations(), 1);
    assert_eq!(report.pull_request.as_ref().map(|pr| pr.id), Some(42));

    let created = h.host.created.lock().unwrap()[0].clone();
    assert_eq!(created.base_branch, "main");
    assert_eq!(Some(created.head_branch.as_str()), report.branch.as_deref());
    assert!(created.title.contains("add health endpoint"));
    assert!(created.body.contains("1. Add a /health route"));

    // The fenced answer is unwrapped before it is written.
    let files = h.sandbox.files.lock().unwrap().clone();
    assert_eq!(files[CODE_PATH], "def health():\n    return 'ok'");
    assert!(files[TEST_PATH].starts_with("from src.main import health"));
}

#[tokio::test]
async fn test_side_effects_follow_phase_order() {
    let h = Harness::new();
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;
    let branch = report.branch.unwrap();

    let calls = h.calls();
    let expected_prefix = vec![
        "acquire".to_string(),
        format!("branch:{branch}"),
        "start".to_string(),
        format!("write:{CODE_PATH}"),
        format!("write:{TEST_PATH}"),
    ];
    assert_eq!(calls[..5], expected_prefix[..]);
    assert!(calls[5].starts_with("run:"));
    assert_eq!(
        calls[6..],
        [
            format!("push:{branch}"),
            "create_pr".to_string(),
            "comments:42".to_string(),
            "stop".to_string(),
            "release".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_single_review_round_is_fixed_once() {
    let h = Harness::new().with_review_batches(
        vec![vec![comment("Add a type hint."), comment("Missing docstring.")]],
        Vec::new(),
    );
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Done);
    assert_eq!(report.fix_attempts, 1);
    assert_eq!(h.pr_creations(), 1);
    assert_eq!(h.count("comments:"), 2);

    let fix_prompts = h.llm.prompts_for(Stage::Fix);
    assert_eq!(fix_prompts.len(), 1);
    let first = fix_prompts[0].find("Add a type hint.").unwrap();
    let second = fix_prompts[0].find("Missing docstring.").unwrap();
    assert!(first < second);
    assert!(fix_prompts[0].contains("def health():"));

    assert_eq!(
        *h.vcs.commits.lock().unwrap(),
        vec![
            "feat: implement requirement".to_string(),
            "fix: address review feedback (attempt 1)".to_string(),
        ]
    );
    assert_eq!(
        h.sandbox.files.lock().unwrap()[CODE_PATH],
        "def health() -> str:\n    return 'ok'"
    );
    // Both pushes commit the generated files and nothing else.
    assert_eq!(
        *h.vcs.staged.lock().unwrap(),
        vec![vec![CODE_PATH, TEST_PATH]; 2]
    );
}

#[tokio::test]
async fn test_endless_review_exhausts_fix_budget() {
    let h = Harness::new().with_review_batches(Vec::new(), vec![comment("Still wrong.")]);
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Error);
    assert_eq!(report.fix_attempts, 3);
    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Fixing);
    assert!(matches!(failure.error, PhaseError::FixBudgetExhausted { max: 3 }));
    assert_eq!(
        failure.error.to_string(),
        "maximum fix attempts reached (3)"
    );

    assert_eq!(h.pr_creations(), 1);
    assert_eq!(h.llm.prompts_for(Stage::Fix).len(), 3);
    // One poll after the first push, one after each of the three fixes.
    assert_eq!(h.count("comments:"), 4);
    assert_eq!(h.count("push:"), 4);
}

#[tokio::test]
async fn test_empty_code_generation_writes_nothing() {
    let h = Harness::new();
    h.llm.reply(Stage::Code, Reply::Text("   \n".to_string()));
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Error);
    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::CodeGeneration);
    assert!(matches!(failure.error, PhaseError::EmptyGeneration("code")));

    assert_eq!(h.count("write:"), 0);
    assert!(h.sandbox.files.lock().unwrap().is_empty());
    assert_eq!(h.pr_creations(), 0);
}

#[tokio::test]
async fn test_non_zero_exit_keeps_output_verbatim() {
    let output = b"FAILED tests/test_main.py::test_health - AssertionError\n\x1b[31m1 failed\x1b[0m\n";
    let h = Harness::new().with_test_result(1, output);
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Error);
    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Testing);
    match failure.error {
        PhaseError::TestsFailed { exit_code, output: captured } => {
            assert_eq!(exit_code, 1);
            assert_eq!(captured, output);
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    // Test failures are not routed through FIXING.
    assert_eq!(report.fix_attempts, 0);
    assert_eq!(h.pr_creations(), 0);
    assert_eq!(h.count("push:"), 0);
}

#[tokio::test]
async fn test_non_utf8_test_output_is_not_rewritten() {
    let output = b"caf\xe9 failed\n\xff\xfe";
    let h = Harness::new().with_test_result(1, output);
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Testing);
    let rendered = failure.error.to_string();
    match &failure.error {
        PhaseError::TestsFailed { output: captured, .. } => assert_eq!(captured, output),
        other => panic!("unexpected failure: {other:?}"),
    }
    // Only the human-readable rendering substitutes invalid bytes.
    assert!(rendered.starts_with("tests failed with exit code 1:\n"));
    assert!(rendered.contains("caf\u{fffd} failed"));
}

#[tokio::test]
async fn test_any_non_zero_exit_is_a_failure() {
    for code in [-1, 2, 127] {
        let h = Harness::new().with_test_result(code, b"boom");
        let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;
        assert_eq!(report.terminal_state, WorkflowState::Error, "exit code {code}");
    }
}

#[tokio::test]
async fn test_no_handler_runs_after_error() {
    let h = Harness::new().with_test_result(1, b"1 failed");
    h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    let calls = h.calls();
    let failed_at = calls.iter().position(|c| c.starts_with("run:")).unwrap();
    assert_eq!(calls[failed_at + 1..], ["stop".to_string(), "release".to_string()]);
    assert!(h.llm.prompts_for(Stage::Fix).is_empty());
}

#[tokio::test]
async fn test_clone_failure_skips_everything_else() {
    let h = Harness::new().with_failing_clone();
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Error);
    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Planning);
    assert!(matches!(
        failure.error,
        PhaseError::Capability(AppError::Git(_))
    ));
    // Nothing was acquired, so there is nothing to tear down.
    assert_eq!(h.calls(), vec!["acquire".to_string()]);
    assert!(report.branch.is_none());
}

#[tokio::test]
async fn test_generation_error_becomes_phase_failure() {
    let h = Harness::new();
    h.llm.reply(Stage::Plan, Reply::Fail);
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Planning);
    assert!(matches!(failure.error, PhaseError::Capability(AppError::Llm(_))));
    assert_eq!(h.count("release"), 1);
}

#[tokio::test]
async fn test_panicking_phase_is_contained() {
    let h = Harness::new();
    h.llm.reply(Stage::Tests, Reply::Panic);
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    assert_eq!(report.terminal_state, WorkflowState::Error);
    let failure = report.failure.unwrap();
    assert_eq!(failure.state, WorkflowState::Testing);
    match failure.error {
        PhaseError::Panicked(message) => assert_eq!(message, "generator exploded"),
        other => panic!("unexpected failure: {other:?}"),
    }
    assert_eq!(h.count("stop"), 1);
    assert_eq!(h.count("release"), 1);
}

#[tokio::test]
async fn test_teardown_runs_once_per_outcome() {
    let done = Harness::new();
    done.orchestrator().run(Uuid::new_v4(), "a").await;

    let exhausted = Harness::new().with_review_batches(Vec::new(), vec![comment("again")]);
    exhausted.orchestrator().run(Uuid::new_v4(), "b").await;

    for h in [&done, &exhausted] {
        assert_eq!(h.count("stop"), 1);
        assert_eq!(h.count("release"), 1);
        let calls = h.calls();
        assert_eq!(calls[calls.len() - 2..], ["stop".to_string(), "release".to_string()]);
    }
}

#[tokio::test]
async fn test_status_events_are_ordered_and_end_with_completion() {
    let h = Harness::new().with_review_batches(vec![vec![comment("nit")]], Vec::new());
    let mut rx = h.status.subscribe();
    let run_id = Uuid::new_v4();
    h.orchestrator().run(run_id, "add health endpoint").await;

    let events = drain(&mut rx);
    assert!(events.iter().all(|e| e.run_id == run_id));
    assert_eq!(events.first().unwrap().phase, "STARTING");
    let last = events.last().unwrap();
    assert_eq!((last.phase.as_str(), last.message.as_str()), ("DONE", "Workflow complete"));

    // Phases appear as contiguous runs in workflow order.
    let mut phases: Vec<&str> = events.iter().map(|e| e.phase.as_str()).collect();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            "STARTING",
            "PLANNING",
            "CODE_GENERATION",
            "TESTING",
            "AWAITING_REVIEW",
            "FIXING",
            "AWAITING_REVIEW",
            "DONE",
        ]
    );
}

#[tokio::test]
async fn test_failed_run_still_announces_completion() {
    let h = Harness::new();
    h.llm.reply(Stage::Code, Reply::Text(String::new()));
    let mut rx = h.status.subscribe();
    let report = h.orchestrator().run(Uuid::new_v4(), "add health endpoint").await;

    let events = drain(&mut rx);
    let n = events.len();
    assert_eq!(events[n - 2].phase, "ERROR");
    assert!(events[n - 2].message.starts_with("CODE_GENERATION failed:"));
    assert_eq!(events[n - 1].message, "Workflow complete");
    assert_eq!(report.terminal_state, WorkflowState::Error);
}

#[tokio::test]
async fn test_awaiting_review_reentry_does_not_recreate_pull_request() {
    let h = Harness::new().with_review_batches(Vec::new(), vec![comment("one more")]);
    let orchestrator = h.orchestrator();
    let status = h.status.for_run(Uuid::new_v4());

    let mut ctx = WorkflowContext::new();
    ctx.attach_workspace(WorkspaceHandle {
        path: PathBuf::from("/tmp/fake-workspace"),
    });
    ctx.set_branch("momentum/feature-abc123".to_string()).unwrap();
    ctx.set_plan("1. do it".to_string()).unwrap();

    let first = orchestrator
        .handle_awaiting_review("add health endpoint", &mut ctx, &status)
        .await
        .unwrap();
    let second = orchestrator
        .handle_awaiting_review("add health endpoint", &mut ctx, &status)
        .await
        .unwrap();

    assert_eq!(first, WorkflowState::Fixing);
    assert_eq!(second, WorkflowState::Fixing);
    assert_eq!(h.pr_creations(), 1);
    assert_eq!(h.count("push:"), 1);
    assert_eq!(h.count("comments:42"), 2);
}

#[tokio::test]
async fn test_fixing_at_budget_fails_without_side_effects() {
    let h = Harness::new();
    let orchestrator = h.orchestrator();
    let status = h.status.for_run(Uuid::new_v4());

    let mut ctx = WorkflowContext::new();
    for _ in 0..3 {
        ctx.begin_fix_attempt();
    }
    ctx.set_review_feedback(vec![comment("please fix")]);

    let err = orchestrator
        .handle_fixing(&mut ctx, &status)
        .await
        .unwrap_err();
    assert!(matches!(err, PhaseError::FixBudgetExhausted { max: 3 }));
    assert_eq!(ctx.fix_attempts(), 3);
    assert!(h.calls().is_empty());
    assert!(h.llm.prompts_for(Stage::Fix).is_empty());
}

#[tokio::test]
async fn test_fixing_requires_feedback() {
    let h = Harness::new();
    let orchestrator = h.orchestrator();
    let status = h.status.for_run(Uuid::new_v4());

    let mut ctx = WorkflowContext::new();
    let err = orchestrator
        .handle_fixing(&mut ctx, &status)
        .await
        .unwrap_err();
    assert!(matches!(err, PhaseError::MissingArtifact("review feedback")));
    assert_eq!(ctx.fix_attempts(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let h = Harness::new();
    let orchestrator = Arc::new(h.orchestrator());

    let a = tokio::spawn({
        let o = Arc::clone(&orchestrator);
        async move { o.run(Uuid::new_v4(), "first").await }
    });
    let b = tokio::spawn({
        let o = Arc::clone(&orchestrator);
        async move { o.run(Uuid::new_v4(), "second").await }
    });
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a.terminal_state, WorkflowState::Done);
    assert_eq!(b.terminal_state, WorkflowState::Done);
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(h.pr_creations(), 2);
    assert_eq!(h.count("release"), 2);
}

#[test]
fn test_feature_branch_name_has_six_hex_digits() {
    let name = feature_branch_name("momentum/feature-");
    let suffix = name.strip_prefix("momentum/feature-").unwrap();
    assert_eq!(suffix.len(), 6);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(name, feature_branch_name("momentum/feature-"));
}
