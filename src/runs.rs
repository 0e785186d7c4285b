use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::status::StatusBroadcaster;
use crate::workflow::{Orchestrator, RunReport, WorkflowState};

/// What the API reports about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub requirement: String,
    /// Last phase seen on the status stream, or the terminal state once finished.
    pub phase: String,
    pub terminal_state: Option<WorkflowState>,
    pub fix_attempts: u32,
    pub branch: Option<String>,
    pub pull_request_url: Option<String>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn is_finished(&self) -> bool {
        self.terminal_state.is_some()
    }
}

#[derive(Debug, Default)]
struct Runs {
    records: HashMap<Uuid, RunRecord>,
    /// Finished run ids, oldest first.
    finished: VecDeque<Uuid>,
}

/// In-memory bookkeeping for runs started by this process.
///
/// In-flight runs are always kept. Only the most recent `max_finished` finished runs
/// stay queryable; older ones are evicted as new runs finish.
#[derive(Debug)]
pub struct RunRegistry {
    runs: RwLock<Runs>,
    max_finished: usize,
}

impl RunRegistry {
    pub fn new(max_finished: usize) -> Self {
        Self {
            runs: RwLock::new(Runs::default()),
            max_finished,
        }
    }

    pub async fn register(&self, run_id: Uuid, requirement: &str) {
        let record = RunRecord {
            run_id,
            requirement: requirement.to_string(),
            phase: WorkflowState::Starting.as_str().to_string(),
            terminal_state: None,
            fix_attempts: 0,
            branch: None,
            pull_request_url: None,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.runs.write().await.records.insert(run_id, record);
    }

    /// Record the phase of a running run. Finished runs are left alone.
    pub async fn update_phase(&self, run_id: Uuid, phase: &str) {
        let mut runs = self.runs.write().await;
        if let Some(record) = runs.records.get_mut(&run_id) {
            if !record.is_finished() {
                record.phase = phase.to_string();
            }
        }
    }

    pub async fn finish(&self, report: &RunReport) {
        let mut runs = self.runs.write().await;
        let Some(record) = runs.records.get_mut(&report.run_id) else {
            tracing::warn!(run_id = %report.run_id, "Finished run was never registered");
            return;
        };

        record.phase = report.terminal_state.as_str().to_string();
        record.terminal_state = Some(report.terminal_state);
        record.fix_attempts = report.fix_attempts;
        record.branch = report.branch.clone();
        record.pull_request_url = report.pull_request.as_ref().map(|pr| pr.url.clone());
        record.failure = report.failure.as_ref().map(|f| format!("{}: {}", f.state, f.error));
        let first_finish = record.finished_at.is_none();
        record.finished_at = Some(Utc::now());

        if first_finish {
            runs.finished.push_back(report.run_id);
        }
        while runs.finished.len() > self.max_finished {
            if let Some(evicted) = runs.finished.pop_front() {
                runs.records.remove(&evicted);
                tracing::debug!(run_id = %evicted, "Evicted finished run");
            }
        }
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunRecord> {
        self.runs.read().await.records.get(&run_id).cloned()
    }

    /// Runs that have not reached DONE or ERROR, oldest first.
    pub async fn in_flight(&self) -> Vec<RunRecord> {
        let runs = self.runs.read().await;
        let mut active: Vec<RunRecord> = runs
            .records
            .values()
            .filter(|r| !r.is_finished())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.started_at);
        active
    }
}

fn is_terminal_phase(phase: &str) -> bool {
    [WorkflowState::Done, WorkflowState::Error]
        .iter()
        .any(|state| state.as_str() == phase)
}

/// Follow the status stream and keep each run's current phase up to date.
///
/// Terminal phases are skipped: every run ends with a DONE event whatever its outcome,
/// so only [`RunRegistry::finish`] records how a run ended.
pub fn track_phases(registry: Arc<RunRegistry>, status: &StatusBroadcaster) -> JoinHandle<()> {
    let mut rx = status.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if is_terminal_phase(&event.phase) => {}
                Ok(event) => registry.update_phase(event.run_id, &event.phase).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Phase tracker lagged behind status stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Start a run on its own task and return its id immediately.
pub async fn launch(
    registry: &Arc<RunRegistry>,
    orchestrator: &Arc<Orchestrator>,
    requirement: String,
) -> Uuid {
    let run_id = Uuid::new_v4();
    registry.register(run_id, &requirement).await;
    tracing::info!(%run_id, requirement = %requirement, "Launching run");

    let registry = Arc::clone(registry);
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        let report = orchestrator.run(run_id, &requirement).await;
        registry.finish(&report).await;
    });

    run_id
}
