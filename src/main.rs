//! Fleet runtime entry point
//!
//! Loads configuration, wires the fleet manager, selector, router, file
//! coordinator, and intelligence store together, then runs one cooperative
//! agent task per configured agent until the session deadline. Individual
//! agent failures never take the runtime down; only unusable configuration
//! or an unwritable workspace aborts startup.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use agent_fleet::agent::InMemoryWorkSource;
use agent_fleet::{
    AgentRuntime, FileCoordinator, FleetConfig, FleetManager, IntelligenceStore, ModelSelector,
    RequestRouter, StatusReporter,
};

const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/fleet.yaml".to_string());
    let config = FleetConfig::load(&config_path).context("configuration unusable")?;

    // Log to stdout and to a daily-rotated file under logs/.
    let log_dir = config.workspace_root.join("logs");
    std::fs::create_dir_all(&log_dir).context("cannot create logs directory")?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "agent_fleet.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_fleet=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!(config = %config_path, "agent_fleet starting");

    // Core components. Construction failures here are fatal by design.
    let fleet = Arc::new(FleetManager::from_config(&config).context("fleet init failed")?);
    let coordinator = Arc::new(
        FileCoordinator::new(&config.workspace_root).context("file coordinator init failed")?,
    );
    let store = Arc::new(
        IntelligenceStore::open(&config.workspace_root, coordinator.clone())
            .await
            .context("intelligence store init failed")?,
    );
    let selector = Arc::new(ModelSelector::new(fleet.clone(), &config));
    let router = Arc::new(RequestRouter::new(fleet.clone(), selector.clone()));
    let work = Arc::new(InMemoryWorkSource::default_backlog());

    // First discovery before agents start asking for models.
    if let Err(e) = fleet.discover().await {
        warn!(error = %e, "initial discovery failed, agents start against an empty fleet");
    }
    let status = fleet.memory_status().await;
    info!(
        models = status.available_models,
        loaded = status.loaded_models,
        vram_mb = status.current_vram_mb,
        budget_mb = status.max_vram_mb,
        "fleet discovered"
    );

    tokio::spawn(fleet.clone().monitor_loop(MONITOR_INTERVAL));

    let deadline = Instant::now() + Duration::from_secs_f64(config.run_hours * 3600.0);
    info!(hours = config.run_hours, agents = config.agents.len(), "spawning agents");

    let mut handles = Vec::new();
    for spec in &config.agents {
        let mut runtime = AgentRuntime::new(
            &spec.id,
            spec.role,
            &config.workspace_root,
            router.clone(),
            coordinator.clone(),
            store.clone(),
            work.clone(),
        );
        let agent_id = spec.id.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = runtime.run(deadline).await {
                // Agent errors are contained; the runtime keeps going.
                warn!(agent = %agent_id, error = %e, "agent session ended with error");
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    // Final session report for the operator.
    let reporter = StatusReporter::new(
        fleet.clone(),
        selector.clone(),
        coordinator.clone(),
        store.clone(),
    );
    let agent_ids: Vec<String> = config.agents.iter().map(|a| a.id.clone()).collect();
    let report = reporter.generate(&agent_ids).await;
    match serde_json::to_string_pretty(&report) {
        Ok(encoded) => info!(report = %encoded, "session report"),
        Err(e) => warn!(error = %e, "could not encode session report"),
    }

    info!(
        loaded = report.memory.loaded_models,
        vram_mb = report.memory.current_vram_mb,
        leases = report.coordination.active_leases,
        "agent_fleet shutting down"
    );
    Ok(())
}
