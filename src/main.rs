//! GridSense - electrical sensor analytics backend
//!
//! Ingests voltage/current/power readings, flags anomalies as they arrive,
//! and serves energy analytics and forecasts over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8000, ./data, ./models
//! ./gridsense
//!
//! # Override locations, JSON logs
//! ./gridsense --addr 127.0.0.1:9000 --data-dir /var/lib/gridsense --log-json
//! ```
//!
//! # Environment Variables
//!
//! - `GRIDSENSE_CONFIG`: Path to a TOML config file (default: ./gridsense.toml)
//! - `GRIDSENSE_ADDR`, `GRIDSENSE_DATA_DIR`, `GRIDSENSE_MODEL_DIR`: CLI overrides
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe stored readings on startup (for testing)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gridsense::api::{create_app, ApiState};
use gridsense::config::GridSenseConfig;
use gridsense::ml_engine::{load_model, AnomalyScorer, ForecastEngine, ModelLoad};
use gridsense::pipeline::IngestionOrchestrator;
use gridsense::storage::{DataDirLock, ReadingStore, SledReadingStore};
use gridsense::types::{ANOMALY_FEATURE_NAMES, FORECAST_FEATURE_NAMES};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gridsense")]
#[command(about = "GridSense electrical sensor analytics backend")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:8000")
    #[arg(short, long, env = "GRIDSENSE_ADDR")]
    addr: Option<String>,

    /// Override the data directory holding the reading database
    #[arg(long, env = "GRIDSENSE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override the directory holding model artifacts
    #[arg(long, env = "GRIDSENSE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Remove all stored readings on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Database Reset
// ============================================================================

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Remove the reading database, leaving the rest of the data directory alone.
fn reset_reading_db(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        info!(path = %db_path.display(), "Reading database does not exist, nothing to reset");
        return Ok(());
    }
    warn!(path = %db_path.display(), "RESET_DB set, removing all stored readings");
    std::fs::remove_dir_all(db_path).context("Failed to remove reading database")?;
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

/// Load both model artifacts. The anomaly model is mandatory.
fn load_models(cfg: &GridSenseConfig) -> Result<(AnomalyScorer, ModelLoad)> {
    let anomaly_path = cfg.models.anomaly_path();
    let scorer = match load_model(&anomaly_path, ANOMALY_FEATURE_NAMES.len()) {
        ModelLoad::Loaded(model) => {
            info!(
                path = %anomaly_path.display(),
                kind = model.kind(),
                "Anomaly model loaded"
            );
            AnomalyScorer::new(model)
        }
        other => {
            error!(model = %other, "Anomaly model unavailable, refusing to serve ingestion");
            anyhow::bail!("anomaly model {other}");
        }
    };

    let forecast = load_model(&cfg.models.forecast_path(), FORECAST_FEATURE_NAMES.len());
    Ok((scorer, forecast))
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!(error = %e, "[HttpServer] Server error");
                Err(anyhow::anyhow!("HTTP server error: {e}"))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!(task = %task_name, "Supervisor: task completed normally");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "Supervisor: task failed");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Supervisor: task panicked");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {e}"));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight requests drain
    while let Some(result) = task_set.join_next().await {
        if let Ok(Err(e)) = result {
            warn!(error = %e, "Task failed during shutdown");
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    // Load configuration, then apply CLI overrides
    let mut cfg = GridSenseConfig::load();
    if let Some(addr) = args.addr {
        cfg.server.addr = addr;
    }
    if let Some(dir) = args.data_dir {
        cfg.storage.data_dir = dir;
    }
    if let Some(dir) = args.model_dir {
        cfg.models.dir = dir;
    }
    cfg.validate().context("Invalid configuration")?;

    info!("GridSense {} starting", env!("CARGO_PKG_VERSION"));

    // Models first: without an anomaly model there is nothing to serve
    let (scorer, forecast_load) = load_models(&cfg)?;
    let forecaster = ForecastEngine::from_load(&forecast_load, cfg.forecast.clone());

    std::fs::create_dir_all(&cfg.storage.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            cfg.storage.data_dir.display()
        )
    })?;
    let _data_lock =
        DataDirLock::acquire(&cfg.storage.data_dir).context("Failed to acquire data directory lock")?;

    let db_path = cfg.storage.readings_db_path();
    if should_reset_db(args.reset_db) {
        reset_reading_db(&db_path)?;
    }
    let sled_store = Arc::new(
        SledReadingStore::open(&db_path)
            .with_context(|| format!("Failed to open reading store at {}", db_path.display()))?,
    );
    let reading_count = sled_store.count(None).await.unwrap_or(0);
    info!(path = %db_path.display(), readings = reading_count, "Reading store opened");
    let store: Arc<dyn ReadingStore> = Arc::clone(&sled_store) as Arc<dyn ReadingStore>;

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        store,
        scorer,
        cfg.ingest.clone(),
        cfg.anomaly.clone(),
    ));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let state = ApiState::new(
        Arc::clone(&orchestrator),
        Arc::new(forecaster),
        cfg.analytics.clone(),
        cfg.live.clone(),
        cancel_token.clone(),
    );
    let app = create_app(state, &cfg.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.addr))?;
    info!(addr = %cfg.server.addr, "HTTP server listening");

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    let outcome = run_supervisor(&mut task_set, cancel_token).await;

    info!("{}", orchestrator.stats());
    if let Err(e) = sled_store.flush() {
        warn!(error = %e, "Failed to flush reading store");
    }

    outcome?;
    info!("GridSense shutdown complete");
    Ok(())
}
