use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{handlers, ws};
use crate::chat::slack;
use crate::config::AppConfig;
use crate::language::LanguageTable;
use crate::runs::{self, RunRegistry};
use crate::status::StatusBroadcaster;
use crate::workflow::{Capabilities, Orchestrator, WorkflowSettings};

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub runs: Arc<RunRegistry>,
    pub status: StatusBroadcaster,
}

impl AppState {
    /// Build the production collaborators. Missing credentials fail here, before any run.
    pub fn new(config: AppConfig) -> crate::error::Result<Self> {
        let caps = Capabilities::from_config(&config)?;
        Ok(Self::with_capabilities(config, caps))
    }

    /// Wire state around the given collaborators and start the phase tracker.
    pub fn with_capabilities(config: AppConfig, caps: Capabilities) -> Self {
        let status = StatusBroadcaster::new(config.agent.status_buffer);
        let languages = Arc::new(LanguageTable::new(config.languages.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            WorkflowSettings::from_config(&config),
            languages,
            caps,
            status.clone(),
        ));
        let runs = Arc::new(RunRegistry::new(config.agent.finished_run_retention));
        runs::track_phases(Arc::clone(&runs), &status);

        Self {
            config,
            orchestrator,
            runs,
            status,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/agent/run", post(handlers::start_run))
        .route("/agent/runs/:id", get(handlers::get_run))
        .route("/ws/status", get(ws::status_stream))
        .route("/slack/commands", post(slack::handle_slash_command))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
