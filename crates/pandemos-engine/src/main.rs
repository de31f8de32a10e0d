//! Service binary for the Pandemos contagion service.
//!
//! This is the main entry point that wires together the region state
//! store, action evaluator, tick scheduler, gateway API, and optional
//! external persistence. It loads configuration, initializes all
//! subsystems, and runs the tick loop until the process is signalled.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `pandemos-config.yaml`
//! 3. Build the region graph and compound registry
//! 4. Bootstrap the region state store, audit log, and evaluator
//! 5. Install the ctrl-c shutdown signal
//! 6. Start the gateway API server
//! 7. Connect persistence and the leader lock (Redis-backed when
//!    enabled, in-process otherwise)
//! 8. Run the tick scheduler until shutdown

mod error;
mod mirror;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pandemos_api::{AppState, ServerConfig, start_server};
use pandemos_core::config::{ServiceConfig, TickConfig};
use pandemos_core::lock::LeaderLock;
use pandemos_core::{
    ActionEvaluator, AuditLog, DiffBroadcaster, LocalLeaderLock, RegionStateStore, TickScheduler,
};
use pandemos_db::{PostgresConfig, PostgresPool, RedisLeaderLock, RedisPool};
use pandemos_model::registry::CompoundRegistry;
use pandemos_model::spread::SpreadParams;
use pandemos_model::topology::RegionGraph;

use crate::error::EngineError;

/// Application entry point for the contagion service.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("pandemos-engine starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        regions = config.topology.len(),
        compounds = config.compounds.len(),
        tick_interval_ms = config.tick.interval_ms,
        persistence_enabled = config.infrastructure.persistence_enabled,
        "Configuration loaded"
    );

    // 3. Build the static catalogs.
    let graph = Arc::new(RegionGraph::from_catalog(&config.topology).map_err(EngineError::from)?);
    let registry = Arc::new(
        CompoundRegistry::from_compounds(config.compounds).map_err(EngineError::from)?,
    );

    // 4. Bootstrap the core components.
    let store = Arc::new(RegionStateStore::bootstrap(
        &config.topology,
        registry.tags(),
    ));
    let audit = Arc::new(AuditLog::new(config.audit.secret));
    let broadcaster = DiffBroadcaster::new();
    let evaluator = Arc::new(ActionEvaluator::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        Arc::clone(&registry),
        config.actions,
    ));
    info!(regions = store.len(), "Region state store bootstrapped");

    // 5. Install the shutdown signal. The gateway drains in-flight
    //    requests on it; the scheduler releases the leader lock.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    // 6. Start the gateway API server.
    let app_state = Arc::new(AppState::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        Arc::clone(&evaluator),
        broadcaster.clone(),
    ));
    let server_config = ServerConfig {
        host: String::from("0.0.0.0"),
        port: config.infrastructure.api_port,
    };
    let api_port = server_config.port;
    let server_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(&server_config, app_state, server_shutdown).await {
            error!(error = %e, "gateway server exited");
        }
    });
    info!(port = api_port, "Gateway API server started");

    let holder_id = format!("pandemos-{}", Uuid::new_v4());

    // 7-8. Pick the leader lock, connect persistence, run the tick loop.
    if config.infrastructure.persistence_enabled {
        let redis = RedisPool::connect(&config.infrastructure.redis_url)
            .await
            .map_err(EngineError::from)?;
        let postgres =
            PostgresPool::connect(&PostgresConfig::from(&config.infrastructure))
                .await
                .map_err(EngineError::from)?;
        postgres.run_migrations().await.map_err(EngineError::from)?;
        info!("Persistence connected (Redis + PostgreSQL)");

        let _mirror_handle = mirror::spawn(
            &broadcaster,
            Arc::clone(&store),
            Arc::clone(&audit),
            redis.clone(),
            postgres,
        );

        let lock = Arc::new(RedisLeaderLock::new(&redis));
        run_scheduler(
            lock,
            store,
            audit,
            broadcaster,
            graph,
            config.tick,
            config.spread,
            holder_id,
            shutdown_rx,
        )
        .await;
    } else {
        let lock = Arc::new(LocalLeaderLock::new());
        run_scheduler(
            lock,
            store,
            audit,
            broadcaster,
            graph,
            config.tick,
            config.spread,
            holder_id,
            shutdown_rx,
        )
        .await;
    }

    info!("pandemos-engine shutdown complete");
    Ok(())
}

/// Build the tick scheduler around the chosen lock and run it until
/// the shutdown signal flips.
#[allow(clippy::too_many_arguments)]
async fn run_scheduler<L>(
    lock: Arc<L>,
    store: Arc<RegionStateStore>,
    audit: Arc<AuditLog>,
    broadcaster: DiffBroadcaster,
    graph: Arc<RegionGraph>,
    tick: TickConfig,
    spread: SpreadParams,
    holder_id: String,
    shutdown: watch::Receiver<bool>,
) where
    L: LeaderLock + Send + Sync,
{
    let scheduler = TickScheduler::new(
        lock,
        store,
        audit,
        broadcaster,
        graph,
        tick,
        spread,
        holder_id,
    );
    scheduler.run(shutdown).await;
}

/// Load the service configuration from `pandemos-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<ServiceConfig, EngineError> {
    let config_path = Path::new("pandemos-config.yaml");
    if config_path.exists() {
        let config = ServiceConfig::from_file(config_path)?;
        Ok(config)
    } else {
        info!("Config file not found, using defaults");
        Ok(ServiceConfig::default())
    }
}
