//! NodeSync Daemon - Background synchronization service
//!
//! Hosts the sync engine for one account:
//! - Opens the local node and transfer caches
//! - Runs a sync pass on start and then every `sync.poll_interval` seconds
//! - Logs node state changes as they are published
//! - Shuts down gracefully on SIGTERM/SIGINT, cancelling a running pass
//!
//! The configuration file defaults to `$XDG_CONFIG_HOME/nodesync/config.yaml`
//! and can be overridden by passing a path as the only argument.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use nodesync_cache::{DatabasePool, SqliteNodeStore, SqliteTransferStore};
use nodesync_core::{config::Config, domain::ContentPaths, ports::INodeStore};
use nodesync_remote::{RemoteClient, RemoteNodeGateway, RenditionPolicy, StaticTokenProvider};
use nodesync_sync::{LocalContentAdapter, SyncContext, SyncCoordinator, SyncTrigger};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// T110: DaemonService struct
// ============================================================================

/// Owns the configuration and the coordinator for the lifetime of the process
struct DaemonService {
    config: Config,
    node_store: Arc<SqliteNodeStore>,
    coordinator: Arc<SyncCoordinator>,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Wires stores, gateway and coordinator from a validated configuration
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let token = config
            .account
            .access_token
            .clone()
            .context("account.access_token is not set")?;

        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open database")?;
        info!(database = %config.storage.database.display(), "Opened database");

        let paths = ContentPaths::new(
            config.storage.content_dir.clone(),
            config.storage.upload_dir.clone(),
        );
        let account_id = config.account.id.clone();
        let node_store = Arc::new(SqliteNodeStore::new(
            db_pool.pool().clone(),
            account_id.clone(),
            paths.clone(),
        ));
        let transfer_store = Arc::new(SqliteTransferStore::new(
            db_pool.pool().clone(),
            account_id.clone(),
        ));

        let client = RemoteClient::new(
            config.account.base_url.clone(),
            Arc::new(StaticTokenProvider::new(token)),
        );
        let gateway = Arc::new(RemoteNodeGateway::new(
            client,
            RenditionPolicy::from_config(&config.renditions),
        ));

        let context = SyncContext {
            node_store: node_store.clone(),
            transfer_store,
            gateway,
            local: Arc::new(LocalContentAdapter::new()),
            publisher: Default::default(),
            paths,
            account_id,
            page_size: config.sync.page_size,
        };
        let coordinator = Arc::new(SyncCoordinator::new(
            context,
            config.sync.max_concurrent_operations,
        ));

        Ok(Self {
            config,
            node_store,
            coordinator,
            shutdown,
        })
    }

    // ========================================================================
    // T111: DaemonService::run()
    // ========================================================================

    async fn run(&self) -> Result<()> {
        let observer = self.coordinator.publisher().spawn_observer(|event| {
            debug!(
                guid = event.guid(),
                status = event.sync_status().as_str(),
                marked_for = event.marked_for().as_str(),
                "Node state changed"
            );
        });

        // Cancel a running pass as soon as shutdown is requested
        let coordinator = Arc::clone(&self.coordinator);
        let shutdown = self.shutdown.clone();
        let canceller = tokio::spawn(async move {
            shutdown.cancelled().await;
            coordinator.cancel();
        });

        let result = self.sync_loop().await;

        canceller.abort();
        observer.abort();
        result
    }

    // ========================================================================
    // T112: Periodic sync passes
    // ========================================================================

    async fn sync_loop(&self) -> Result<()> {
        let poll_secs = self.config.sync.poll_interval;
        info!(poll_interval_secs = poll_secs, "Starting sync loop");

        let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
        // The first tick fires immediately; the first pass runs right away
        interval.tick().await;
        let mut trigger = SyncTrigger::SyncNow;

        loop {
            match self.coordinator.run_pass(trigger).await {
                Ok(report) => {
                    if report.cancelled {
                        info!(pass_id = %report.pass_id, "Sync pass cancelled");
                    }
                    self.log_status_counts().await;
                }
                Err(e) => warn!(error = %e, "Sync pass not started"),
            }
            trigger = SyncTrigger::Background;

            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Sync loop terminated");
        Ok(())
    }

    async fn log_status_counts(&self) {
        let mut counts: Vec<_> = self.node_store.count_by_status().await.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.as_str());
        let summary = counts
            .iter()
            .map(|(status, count)| format!("{}={}", status.as_str(), count))
            .collect::<Vec<_>>()
            .join(" ");
        info!(nodes = %summary, "Cache status");
    }
}

// ============================================================================
// T113: Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// T114: Main entry point
// ============================================================================

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = Config::load_or_default(&config_path);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "NodeSync daemon starting (nodesyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(%e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("NodeSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "NodeSync daemon exiting with error"),
    }

    result
}
