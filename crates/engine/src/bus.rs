//! Event bus — post-commit fan-out of order transitions.
//!
//! Publication is decoupled from delivery: [`EventBus::publish`] enqueues
//! onto an unbounded dispatch channel and never blocks the committing
//! caller. A dedicated [`EventDispatcher`] task drains the channel in FIFO
//! order and fans each update out to the investor's live subscribers, so a
//! subscriber sees each order's transitions in commit order. Delivery is
//! best-effort: there is no durable queue and no replay. A disconnected
//! subscriber re-reads state through the query API instead.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use oc_core::types::{InvestorId, Order, OrderId, OrderStatus};

/// One published order transition, carrying the post-transition snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    /// The transitioning order.
    pub order_id: OrderId,
    /// Status before the transition; `None` for the creation event.
    pub previous_status: Option<OrderStatus>,
    /// Status after the transition.
    pub new_status: OrderStatus,
    /// Full order snapshot after the transition.
    pub order: Order,
}

type SubscriberTable = Arc<DashMap<InvestorId, Vec<mpsc::UnboundedSender<OrderUpdate>>>>;

/// Handle for publishing transitions and registering subscribers.
///
/// Cheap to clone; all clones share the same subscriber table and dispatch
/// channel.
#[derive(Clone)]
pub struct EventBus {
    subscribers: SubscriberTable,
    dispatch_tx: mpsc::UnboundedSender<OrderUpdate>,
}

/// The delivery side of the bus. Run it on its own task.
pub struct EventDispatcher {
    subscribers: SubscriberTable,
    dispatch_rx: mpsc::UnboundedReceiver<OrderUpdate>,
}

impl EventBus {
    /// Create a bus and its paired dispatcher.
    pub fn new() -> (Self, EventDispatcher) {
        let subscribers: SubscriberTable = Arc::new(DashMap::new());
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        (
            Self {
                subscribers: subscribers.clone(),
                dispatch_tx,
            },
            EventDispatcher {
                subscribers,
                dispatch_rx,
            },
        )
    }

    /// Publish a committed transition. Non-blocking; must only be called
    /// after the owning transaction has committed.
    pub fn publish(&self, update: OrderUpdate) {
        // Send fails only when the dispatcher is gone (shutdown); events
        // are best-effort, so that is not an error.
        let _ = self.dispatch_tx.send(update);
    }

    /// Register a subscriber for one investor's order updates.
    pub fn subscribe(&self, investor_id: InvestorId) -> mpsc::UnboundedReceiver<OrderUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(investor_id).or_default().push(tx);
        rx
    }

    /// Number of live subscriptions for an investor (diagnostics).
    pub fn subscriber_count(&self, investor_id: InvestorId) -> usize {
        self.subscribers
            .get(&investor_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl EventDispatcher {
    /// Drain the dispatch channel until cancellation, fanning each update
    /// out to the investor's subscribers and pruning closed ones.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("event dispatcher started");
        loop {
            tokio::select! {
                maybe_update = self.dispatch_rx.recv() => {
                    let Some(update) = maybe_update else { break };
                    self.deliver(update);
                }
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("event dispatcher stopped");
    }

    fn deliver(&self, update: OrderUpdate) {
        let investor_id = update.order.investor_id;
        let Some(mut entry) = self.subscribers.get_mut(&investor_id) else {
            return;
        };
        entry.retain(|tx| tx.send(update.clone()).is_ok());
        if entry.is_empty() {
            drop(entry);
            self.subscribers.remove_if(&investor_id, |_, v| v.is_empty());
        }
    }
}
