//! Workflow worker pool.
//!
//! A fixed number of OS threads drain order ids from a shared queue and
//! drive each order's workflow to completion. Bounded workers replace an
//! unawaited per-order task launch, so load stays bounded and failures are
//! observable in one place.
//!
//! Per-order serialization: an order id is enqueued exactly once per
//! driving occasion (creation, or startup recovery of a non-terminal
//! order), and a single worker owns the id from dequeue until
//! `run_workflow` returns, so at most one worker processes a given order at
//! a time.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use oc_core::types::OrderId;

use crate::engine::OrderEngine;

/// Create the workflow queue shared by the engine and the pool.
pub fn queue() -> (Sender<OrderId>, Receiver<OrderId>) {
    crossbeam::channel::unbounded()
}

/// A running pool of workflow worker threads.
pub struct WorkflowPool {
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl WorkflowPool {
    /// Spawn `workers` threads draining the queue until cancellation.
    pub fn spawn(
        engine: Arc<OrderEngine>,
        rx: Receiver<OrderId>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let engine = engine.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            let handle = std::thread::Builder::new()
                .name(format!("workflow-{i}"))
                .spawn(move || worker_loop(engine, rx, cancel))
                .expect("failed to spawn workflow worker");
            handles.push(handle);
        }
        Self { handles }
    }

    /// Wait for all workers to exit. Call after cancelling the token.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(engine: Arc<OrderEngine>, rx: Receiver<OrderId>, cancel: CancellationToken) {
    tracing::info!("workflow worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(order_id) => engine.run_workflow(order_id),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::info!("workflow worker stopped");
}
