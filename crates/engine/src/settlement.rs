//! Settlement scheduler — deferred `Filled -> Settled` transitions.
//!
//! The scheduler's timer wheel is process-local and reconstructible: the
//! authoritative state is the store. [`recover`] rebuilds pending jobs on
//! startup by scanning filled orders without a settlement timestamp, so a
//! restart never loses a due settlement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use oc_core::types::OrderId;
use oc_store::{MemStore, StoreError};

use crate::engine::OrderEngine;

/// One deferred settlement.
#[derive(Debug, Clone, Copy)]
pub struct SettlementJob {
    /// The order to settle.
    pub order_id: OrderId,
    /// When the settlement falls due (`executed_at + settlement delay`).
    pub due_at: DateTime<Utc>,
}

/// Handle for placing deferred settlement jobs. Cheap to clone.
#[derive(Clone)]
pub struct SettlementHandle {
    tx: mpsc::UnboundedSender<SettlementJob>,
}

impl SettlementHandle {
    /// Place a deferred job. Non-blocking.
    pub fn schedule(&self, order_id: OrderId, due_at: DateTime<Utc>) {
        if self.tx.send(SettlementJob { order_id, due_at }).is_err() {
            tracing::warn!(
                order_id = %order_id,
                "settlement scheduler is down; job will be recovered on restart"
            );
        }
    }
}

/// Create the scheduling channel.
pub fn channel() -> (SettlementHandle, mpsc::UnboundedReceiver<SettlementJob>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SettlementHandle { tx }, rx)
}

/// Run the scheduler until cancellation.
///
/// Jobs wait in a [`DelayQueue`]; at the due time the engine re-reads the
/// order and settles it iff it is still `Filled` (anything else is a silent
/// no-op). Jobs for distinct orders are independent.
pub async fn run(
    engine: Arc<OrderEngine>,
    mut rx: mpsc::UnboundedReceiver<SettlementJob>,
    cancel: CancellationToken,
) {
    let mut queue: DelayQueue<OrderId> = DelayQueue::new();
    tracing::info!("settlement scheduler started");

    loop {
        tokio::select! {
            maybe_job = rx.recv() => {
                let Some(job) = maybe_job else { break };
                let delay = (job.due_at - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                queue.insert(job.order_id, delay);
                tracing::debug!(
                    order_id = %job.order_id,
                    due_at = %job.due_at,
                    "settlement scheduled"
                );
            }
            expired = std::future::poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                if let Some(expired) = expired {
                    engine.settle_due(expired.into_inner());
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("settlement scheduler stopped");
}

/// Reconstruct pending jobs after a restart.
///
/// Scans orders that filled but never settled and re-schedules each at
/// `executed_at + delay`; overdue jobs fire immediately. Returns the number
/// of jobs recovered.
pub fn recover(
    store: &MemStore,
    handle: &SettlementHandle,
    delay: chrono::Duration,
) -> Result<usize, StoreError> {
    let pending = store.filled_unsettled_orders()?;
    let count = pending.len();
    for order in pending {
        let executed_at = order.executed_at.unwrap_or_else(Utc::now);
        handle.schedule(order.id, executed_at + delay);
    }
    if count > 0 {
        tracing::info!(count, "recovered pending settlements");
    }
    Ok(count)
}
