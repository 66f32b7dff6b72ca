//! The long-running daemon: gossip HTTP API + periodic anti-entropy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use keel_engine::PushOrchestrator;
use keel_store::Store;
use tokio::sync::watch;
use tracing::{info, warn};

/// Runtime settings for [`run`].
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen_addr: String,
    pub gossip_interval: Duration,
    pub sync_limit: usize,
    pub max_sync_rounds: usize,
    pub http_timeout: Duration,
}

/// Serve the sync endpoints and run the gossip loop until `shutdown`
/// resolves.
///
/// Every `gossip_interval` the loop syncs each registered peer and then
/// processes the pending-push queue. A failing peer never stops the loop.
/// On shutdown the HTTP server drains in-flight requests before returning.
pub async fn run(
    store: Arc<Store>,
    orchestrator: Arc<PushOrchestrator>,
    config: DaemonConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("could not bind {}", config.listen_addr))?;
    info!(
        addr = %config.listen_addr,
        node_id = %store.node_id(),
        interval_secs = config.gossip_interval.as_secs(),
        "gossip API listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let gossip = tokio::spawn(gossip_loop(
        store.clone(),
        orchestrator,
        config.clone(),
        stop_rx,
    ));

    axum::serve(listener, keel_sync::router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .context("gossip API server failed")?;

    let _ = stop_tx.send(true);
    let _ = gossip.await;
    info!("daemon stopped");
    Ok(())
}

async fn gossip_loop(
    store: Arc<Store>,
    orchestrator: Arc<PushOrchestrator>,
    config: DaemonConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.gossip_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = stop_rx.changed() => {
                info!("gossip loop stopped");
                return;
            }
        }

        let peers = store.peers().list();
        if !peers.is_empty() {
            let report = keel_sync::sync_all(
                &store,
                config.sync_limit,
                config.max_sync_rounds,
                config.http_timeout,
            )
            .await;
            if !report.failures.is_empty() {
                warn!(failed = report.failures.len(), "some peers failed to sync");
            }
        }

        // The queue does blocking file and subprocess work.
        let orchestrator = orchestrator.clone();
        match tokio::task::spawn_blocking(move || orchestrator.process_pending(None)).await {
            Ok(report) if report.checked > 0 => {
                info!(
                    checked = report.checked,
                    executed = report.executed,
                    pending = report.pending,
                    failed = report.failed,
                    "processed pending pushes"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(%e, "pending push pass panicked"),
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
