use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use momentum::config::AppConfig;
use momentum::language::LanguageTable;
use momentum::server::{create_router, AppState};
use momentum::shutdown::{graceful_shutdown, wait_for_shutdown};
use momentum::status::StatusBroadcaster;
use momentum::workflow::{Capabilities, Orchestrator, WorkflowSettings, WorkflowState};

#[derive(Parser)]
#[command(name = "momentum", about = "Turns a requirement into a reviewed pull request")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Execute one workflow in the foreground and print its timeline
    Run {
        /// Natural-language requirement
        requirement: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { requirement } => run_once(config, &requirement).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        repository = %config.github.repository,
        "Starting Momentum server"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config)?);
    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state).await;

    Ok(())
}

async fn run_once(config: AppConfig, requirement: &str) -> anyhow::Result<ExitCode> {
    let caps = Capabilities::from_config(&config)?;
    let status = StatusBroadcaster::new(config.agent.status_buffer);
    let orchestrator = Orchestrator::new(
        WorkflowSettings::from_config(&config),
        Arc::new(LanguageTable::new(config.languages.clone())),
        caps,
        status.clone(),
    );

    let mut rx = status.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!(
                "{} [{:<15}] {}",
                event.timestamp.format("%H:%M:%S"),
                event.phase,
                event.message
            );
            if event.phase == WorkflowState::Done.as_str() {
                break;
            }
        }
    });

    let report = orchestrator.run(Uuid::new_v4(), requirement).await;
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
