//! The daemon server loop: binds the RPC router, runs background
//! maintenance tasks, and shuts down gracefully. Modeled on
//! `gossipd::server::Server`'s `spawn_sync_task`/`spawn_prune_task` +
//! broadcast-channel shutdown, with the protocol-specific accept loop
//! replaced by `axum::serve`.

use crate::config::Config;
use crate::routes;
use crate::state::AppState;
use stat7_anchor::StateThresholds;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),
    #[error("initialization failed: {0}")]
    Init(#[from] anyhow::Error),
}

pub struct Server {
    config: Config,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let state = Arc::new(AppState::build(&config)?);
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Server {
            config,
            state,
            shutdown_tx,
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn run(&self) -> Result<(), ServerError> {
        let heat_decay_handle = self.spawn_heat_decay_task();
        let cache_sweep_handle = self.spawn_cache_sweep_task();

        let app = routes::router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.config.listen).await?;
        info!(addr = %self.config.listen, "stat7d listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("shutting down gracefully");
        });

        if let Err(e) = server.await {
            error!(error = %e, "server error");
        }

        heat_decay_handle.abort();
        cache_sweep_handle.abort();
        self.state.store.flush().map_err(|e| ServerError::Init(e.into()))?;

        Ok(())
    }

    /// Periodic heat decay + scheduled horizon transitions across all
    /// anchors (spec §4.4/§5), mirroring `spawn_sync_task`'s select-loop
    /// shape.
    fn spawn_heat_decay_task(&self) -> tokio::task::JoinHandle<()> {
        let anchors = self.state.anchors.clone();
        let lambda = self.config.heat_decay_lambda;
        let interval_secs = self.config.heat_decay_interval_secs;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            let thresholds = StateThresholds::default();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = stat7_core::Timestamp::now();
                        if let Err(e) = anchors.heat_decay(now, lambda, &thresholds) {
                            tracing::warn!(error = %e, "heat decay sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    /// Periodic retrieval cache invalidation beyond the TTL (spec §6
    /// `cache_ttl_seconds`) — entries expire lazily on read, this just
    /// bounds how long a stale-but-unread entry can linger.
    fn spawn_cache_sweep_task(&self) -> tokio::task::JoinHandle<()> {
        let retrieval = self.state.retrieval.clone();
        let cache_ttl = self.state.cache_ttl;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(cache_ttl.max(Duration::from_secs(1)));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        retrieval.invalidate_cache("ttl_sweep");
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}
