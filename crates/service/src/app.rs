//! Service wiring — builds the store, engine, worker pool, settlement
//! scheduler, and event dispatcher, then runs until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use oc_core::config::AppConfig;
use oc_engine::{settlement, worker, EventBus, OrderEngine, WorkflowPool};
use oc_store::MemStore;

use crate::seed;
use crate::server::{self, AppState};

/// The assembled service.
pub struct App {
    config: AppConfig,
}

impl App {
    /// Build the service from configuration.
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run the service.
    ///
    /// Spawns the event dispatcher, settlement scheduler, workflow pool, and
    /// HTTP server; recovers interrupted workflows and pending settlements
    /// from the store; then blocks until SIGINT or internal cancellation.
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        // ── Store (journal replay happens here) ──────────────────────
        let store = match &config.store.journal_path {
            Some(path) => MemStore::open(path)?,
            None => {
                tracing::warn!("no journal configured; state will not survive a restart");
                MemStore::in_memory()
            }
        }
        .with_lock_timeout(Duration::from_millis(config.store.lock_timeout_ms));
        let store = Arc::new(store);

        if let Some(path) = &config.store.seed_path {
            seed::load(path, &store)?;
        }

        let cancel = CancellationToken::new();

        // ── Event bus + dispatcher ───────────────────────────────────
        let (bus, dispatcher) = EventBus::new();
        tokio::spawn(dispatcher.run(cancel.clone()));

        // ── Engine, settlement scheduler, workflow pool ──────────────
        let (settlement_handle, settlement_rx) = settlement::channel();
        let (workflow_tx, workflow_rx) = worker::queue();
        let recovery_tx = workflow_tx.clone();

        let engine = Arc::new(OrderEngine::new(
            store.clone(),
            bus.clone(),
            settlement_handle.clone(),
            workflow_tx,
            config.engine.clone(),
            Duration::from_millis(config.settlement.delay_ms),
        ));

        tokio::spawn(settlement::run(
            engine.clone(),
            settlement_rx,
            cancel.clone(),
        ));

        // ── Recovery: re-enqueue interrupted work ────────────────────
        let delay = chrono::Duration::milliseconds(config.settlement.delay_ms as i64);
        settlement::recover(&store, &settlement_handle, delay)?;

        let pending = store.pending_workflow_orders()?;
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "re-enqueueing interrupted workflows");
            for order in pending {
                let _ = recovery_tx.send(order.id);
            }
        }

        let pool = WorkflowPool::spawn(
            engine.clone(),
            workflow_rx,
            config.engine.workers,
            cancel.clone(),
        );

        // ── HTTP server ──────────────────────────────────────────────
        let state = AppState {
            engine: engine.clone(),
            bus: bus.clone(),
        };
        let port = config.server.port;
        let server_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(state, port, server_cancel).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        });

        tracing::info!(
            workers = config.engine.workers,
            settlement_delay_ms = config.settlement.delay_ms,
            "service started"
        );

        // ── Shutdown ─────────────────────────────────────────────────
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = cancel.cancelled() => {
                tracing::info!("cancellation token triggered");
            }
        }

        cancel.cancel();
        pool.join();

        tracing::info!("service stopped");
        Ok(())
    }
}
