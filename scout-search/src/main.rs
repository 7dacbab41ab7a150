//! scout-search - Multi-stage vacancy search service
//!
//! Runs Collection → Filtering → Enrichment pipelines per search session and
//! exposes them over HTTP REST + SSE.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scout_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver};
use scout_common::events::EventBus;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scout_search::db::{init_database_pool, SqliteSnapshotStore};
use scout_search::services::{
    build_scrapers, CollectionConfig, OpenAiClientFactory, OrchestratorConfig, SearchOrchestrator,
};
use scout_search::AppState;

const DEFAULT_SCRAPER_SERVICE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_SITES: [&str; 2] = ["linkedin", "indeed"];
const EVENT_BUS_CAPACITY: usize = 256;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Command-line arguments for scout-search
#[derive(Parser, Debug)]
#[command(name = "scout-search")]
#[command(about = "Multi-stage vacancy search service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the TOML server.port)
    #[arg(short, long, env = "SCOUT_SEARCH_PORT")]
    port: Option<u16>,

    /// Root folder holding the session database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/vacancy-scout/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config(args.config.as_deref());

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting scout-search (Multi-stage vacancy search)");
    info!(
        "Version: {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("scout-search")
        .with_cli_arg(args.root_folder.clone())
        .with_toml_config(&toml_config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database_pool(&db_path).await?;
    let store = Arc::new(SqliteSnapshotStore::new(pool));

    let service_url = toml_config
        .scraper_service_url
        .clone()
        .unwrap_or_else(|| DEFAULT_SCRAPER_SERVICE_URL.to_string());
    let sites = toml_config
        .scraper_sites
        .clone()
        .unwrap_or_else(|| DEFAULT_SITES.iter().map(|s| s.to_string()).collect());
    let scrapers = build_scrapers(&service_url, &sites).context("Failed to build scrapers")?;
    info!(url = %service_url, sites = %sites.join(", "), "Scraping service configured");

    let defaults = OrchestratorConfig::default();
    let config = OrchestratorConfig {
        collection: CollectionConfig::from_tuning(&toml_config.collection),
        session_retention: toml_config
            .session_retention_minutes
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.session_retention),
        toml_api_key: toml_config.openai_api_key.clone(),
        ..defaults
    };

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let orchestrator = SearchOrchestrator::new(
        scrapers,
        store,
        Arc::new(OpenAiClientFactory::new()),
        event_bus,
        config,
    );

    let state = AppState::new(orchestrator.clone());

    match orchestrator.recover_interrupted_sessions().await {
        Ok(0) => {}
        Ok(count) => info!(count, "Marked interrupted sessions as stopped (resumable)"),
        Err(e) => {
            warn!(error = %e, "Crash recovery failed");
            state.record_error(format!("crash recovery: {}", e)).await;
        }
    }

    let sweeper = orchestrator.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweeper.sweep_finished_sessions().await;
        }
    });

    let app = scout_search::build_router(state);

    let port = args.port.unwrap_or(toml_config.server.port);
    let addr = format!("{}:{}", toml_config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
