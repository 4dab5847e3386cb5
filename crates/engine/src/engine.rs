//! Order engine — owns the lifecycle state machine and orchestrates
//! idempotent admission, validation, execution, and settlement hand-off.
//!
//! Every transition runs in its own store transaction, writes one state-log
//! record inside that transaction, and is published on the event bus only
//! after the transaction commits. The engine is the sole writer of orders,
//! trades, holdings, and state logs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::Sender;

use oc_core::config::EngineConfig;
use oc_core::types::market::Asset;
use oc_core::types::{
    AssetId, Holding, IdempotencyRecord, InvestorId, Order, OrderId, OrderStateLog, OrderStatus,
    Side, Trade, TradeId,
};
use oc_store::{MemStore, StoreError, Tx};
use rust_decimal::Decimal;

use crate::bus::{EventBus, OrderUpdate};
use crate::holdings;
use crate::idempotency::{self, Reservation};
use crate::settlement::SettlementHandle;
use crate::validator;

/// Actor labels recorded in the state log.
const ACTOR_API: &str = "api";
const ACTOR_WORKFLOW: &str = "workflow";
const ACTOR_SETTLEMENT: &str = "settlement";

/// Engine operation errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    NotFound(OrderId),
    /// The requested operation is not allowed in the order's current status.
    #[error("operation not allowed in status {status}")]
    InvalidState { status: OrderStatus },
    /// The workflow deadline elapsed before the operation could complete.
    #[error("timeout")]
    Timeout,
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A validated order submission.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub investor_id: InvestorId,
    pub asset_id: AssetId,
    pub side: Side,
    pub quantity: Decimal,
    /// `None` submits a market order.
    pub price: Option<Decimal>,
}

/// Outcome of one workflow step.
enum Step {
    /// More transitions remain; call [`OrderEngine::step`] again.
    Continue,
    /// The order reached a resting or terminal state.
    Done,
}

/// The order lifecycle engine.
pub struct OrderEngine {
    store: Arc<MemStore>,
    bus: EventBus,
    settlement: SettlementHandle,
    workflow_tx: Sender<OrderId>,
    config: EngineConfig,
    settlement_delay: chrono::Duration,
}

impl OrderEngine {
    /// Build an engine over the given store and collaborators.
    pub fn new(
        store: Arc<MemStore>,
        bus: EventBus,
        settlement: SettlementHandle,
        workflow_tx: Sender<OrderId>,
        config: EngineConfig,
        settlement_delay: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            settlement,
            workflow_tx,
            config,
            settlement_delay: chrono::Duration::from_std(settlement_delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(10)),
        }
    }

    // ── Client-facing operations ───────────────────────────────────────

    /// Accept an order submission.
    ///
    /// Synchronous: returns once the `New` record is durably committed.
    /// A submission carrying an already-used idempotency key returns the
    /// prior order as-is without re-processing. The workflow beyond `New`
    /// runs asynchronously on the worker pool.
    pub fn create_order(
        &self,
        request: CreateOrderRequest,
        idempotency_key: Option<String>,
    ) -> Result<Order, EngineError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.workflow_deadline_ms);
        let (order, created) = self.with_retries(deadline, || {
            self.try_create(&request, idempotency_key.as_deref())
        })?;

        if created {
            self.bus.publish(OrderUpdate {
                order_id: order.id,
                previous_status: None,
                new_status: OrderStatus::New,
                order: order.clone(),
            });
            if self.workflow_tx.send(order.id).is_err() {
                tracing::error!(
                    order_id = %order.id,
                    "workflow queue closed; order will be recovered on restart"
                );
            }
            tracing::info!(
                order_id = %order.id,
                investor_id = %order.investor_id,
                asset_id = %order.asset_id,
                side = %order.side,
                "order accepted"
            );
        }

        Ok(order)
    }

    /// One creation attempt: idempotency reservation, persist, log, commit.
    /// Returns the order and whether it was newly created.
    fn try_create(
        &self,
        request: &CreateOrderRequest,
        raw_key: Option<&str>,
    ) -> Result<(Order, bool), EngineError> {
        let mut tx = self.store.begin()?;

        let key = raw_key.map(idempotency::normalize_key);
        if let Some(key) = &key {
            if let Reservation::Existing(order_id) = idempotency::reserve(&tx, key) {
                let prior = tx.get_order(order_id).ok_or_else(|| {
                    StoreError::Fatal(format!(
                        "idempotency key maps to missing order {order_id}"
                    ))
                })?;
                if payload_diverges(&prior, request) {
                    tracing::warn!(
                        order_id = %order_id,
                        "idempotent resubmission with divergent payload; returning prior order"
                    );
                }
                return Ok((prior, false));
            }
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            investor_id: request.investor_id,
            asset_id: request.asset_id,
            side: request.side,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::New,
            idempotency_key: key.clone(),
            ordered_at: now,
            executed_at: None,
            settled_at: None,
        };

        tx.put_order(order.clone());
        if let Some(key) = key {
            tx.put_idempotency(IdempotencyRecord {
                key,
                order_id: order.id,
                created_at: now,
            })?;
        }
        tx.append_log(OrderStateLog {
            order_id: order.id,
            from_status: None,
            to_status: OrderStatus::New,
            reason: "Order created".into(),
            logged_by: ACTOR_API.into(),
            logged_at: now,
        });
        tx.commit()?;

        Ok((order, true))
    }

    /// Cancel an order. Accepted only while the order is in `New` or
    /// `Validated`; the transaction holds the store lock, so a concurrent
    /// worker cannot move the order past those states underneath us.
    pub fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order, EngineError> {
        let tx = self.store.begin()?;
        let order = tx
            .get_order(order_id)
            .ok_or(EngineError::NotFound(order_id))?;
        if !order.status.is_cancellable() {
            return Err(EngineError::InvalidState {
                status: order.status,
            });
        }
        self.apply_transition(tx, order, OrderStatus::Cancelled, reason, ACTOR_API)
    }

    /// Fetch one order.
    pub fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, EngineError> {
        Ok(self.store.get_order(order_id)?)
    }

    /// All orders of one investor, newest first.
    pub fn list_orders_for_investor(
        &self,
        investor_id: InvestorId,
        from: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<Order>, EngineError> {
        Ok(self.store.orders_for_investor(investor_id, from)?)
    }

    /// All holdings of one investor.
    pub fn holdings_for_investor(
        &self,
        investor_id: InvestorId,
    ) -> Result<Vec<Holding>, EngineError> {
        Ok(self.store.holdings_for_investor(investor_id)?)
    }

    /// Fetch one asset.
    pub fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>, EngineError> {
        Ok(self.store.get_asset(asset_id)?)
    }

    // ── Workflow driving (worker pool entry points) ────────────────────

    /// Drive one order's workflow as far as it goes.
    ///
    /// Resumable from any intermediate status, so startup recovery can
    /// re-enqueue interrupted orders. Transient store failures are retried
    /// with exponential backoff under an overall deadline; exhaustion
    /// absorbs the failure into a terminal `Rejected` so the client always
    /// observes a definitive outcome.
    pub fn run_workflow(&self, order_id: OrderId) {
        let deadline = Instant::now() + Duration::from_millis(self.config.workflow_deadline_ms);
        loop {
            match self.with_retries(deadline, || self.step(order_id)) {
                Ok(Step::Continue) => continue,
                Ok(Step::Done) => break,
                Err(e) => {
                    tracing::error!(
                        order_id = %order_id,
                        error = %e,
                        "workflow failed; rejecting order"
                    );
                    let detail = match &e {
                        EngineError::Timeout => "timeout".to_string(),
                        other => other.to_string(),
                    };
                    self.reject_for_error(order_id, &detail);
                    break;
                }
            }
        }
    }

    /// Perform exactly one transition for the order's current status.
    fn step(&self, order_id: OrderId) -> Result<Step, EngineError> {
        let tx = self.store.begin()?;
        let order = tx
            .get_order(order_id)
            .ok_or(EngineError::NotFound(order_id))?;

        match order.status {
            OrderStatus::New => {
                self.apply_transition(
                    tx,
                    order,
                    OrderStatus::Validating,
                    "Validation started",
                    ACTOR_WORKFLOW,
                )?;
                Ok(Step::Continue)
            }
            OrderStatus::Validating => {
                let investor = tx.get_investor(order.investor_id);
                let asset = tx.get_asset(order.asset_id);
                let holding = tx.get_holding(order.investor_id, order.asset_id);
                match validator::validate(
                    &order,
                    investor.as_ref(),
                    asset.as_ref(),
                    holding.as_ref(),
                ) {
                    Ok(()) => {
                        self.apply_transition(
                            tx,
                            order,
                            OrderStatus::Validated,
                            "Validation passed",
                            ACTOR_WORKFLOW,
                        )?;
                        Ok(Step::Continue)
                    }
                    Err(reason) => {
                        self.apply_transition(
                            tx,
                            order,
                            OrderStatus::Rejected,
                            &reason.to_string(),
                            ACTOR_WORKFLOW,
                        )?;
                        Ok(Step::Done)
                    }
                }
            }
            OrderStatus::Validated => {
                self.apply_transition(
                    tx,
                    order,
                    OrderStatus::Executing,
                    "Execution started",
                    ACTOR_WORKFLOW,
                )?;
                Ok(Step::Continue)
            }
            OrderStatus::Executing => {
                self.execute(tx, order)?;
                Ok(Step::Continue)
            }
            OrderStatus::Filled => {
                let executed_at = order.executed_at.unwrap_or_else(Utc::now);
                self.settlement
                    .schedule(order.id, executed_at + self.settlement_delay);
                Ok(Step::Done)
            }
            // Terminal: nothing further to do or emit. Covers the race
            // where a cancellation landed between steps.
            OrderStatus::Settled | OrderStatus::Rejected | OrderStatus::Cancelled => {
                Ok(Step::Done)
            }
        }
    }

    /// Execute the trade: trade insert, holdings mutation, and the
    /// `Executing -> Filled` transition, all in one transaction.
    fn execute(&self, mut tx: Tx<'_>, mut order: Order) -> Result<Order, EngineError> {
        let now = Utc::now();
        let Some(asset) = tx.get_asset(order.asset_id) else {
            return self.apply_transition(
                tx,
                order,
                OrderStatus::Rejected,
                "System error: asset not found",
                ACTOR_WORKFLOW,
            );
        };
        let execution_price = order.price.unwrap_or(asset.current_price);
        let holding = tx.get_holding(order.investor_id, order.asset_id);

        match order.side {
            Side::Buy => {
                let updated = holdings::apply_buy(
                    holding,
                    order.investor_id,
                    order.asset_id,
                    order.quantity,
                    execution_price,
                    now,
                );
                tx.put_holding(updated);
            }
            Side::Sell => match holdings::apply_sell(holding, order.quantity, now) {
                Ok(Some(updated)) => tx.put_holding(updated),
                Ok(None) => tx.delete_holding(order.investor_id, order.asset_id),
                // Re-checked inside the transaction; the earlier validator
                // pass was advisory. Rejecting here stages no trade and no
                // holding mutation.
                Err(reason) => {
                    return self.apply_transition(
                        tx,
                        order,
                        OrderStatus::Rejected,
                        &reason.to_string(),
                        ACTOR_WORKFLOW,
                    );
                }
            },
        }

        tx.put_trade(Trade {
            id: TradeId::generate(),
            order_id: order.id,
            investor_id: order.investor_id,
            asset_id: order.asset_id,
            side: order.side,
            quantity: order.quantity,
            execution_price,
            traded_at: now,
        });

        order.executed_at = Some(now);
        self.apply_transition(tx, order, OrderStatus::Filled, "Order filled", ACTOR_WORKFLOW)
    }

    /// Settle an order whose deferred job fell due.
    ///
    /// Silent no-op unless the order is still `Filled`; it may have been
    /// mutated by an administrative action in the meantime.
    pub fn settle_due(&self, order_id: OrderId) {
        let deadline = Instant::now() + Duration::from_millis(self.config.workflow_deadline_ms);
        let result = self.with_retries(deadline, || {
            let tx = self.store.begin()?;
            let Some(mut order) = tx.get_order(order_id) else {
                return Ok(());
            };
            if order.status != OrderStatus::Filled {
                tracing::debug!(
                    order_id = %order_id,
                    status = %order.status,
                    "settlement due for non-filled order; skipping"
                );
                return Ok(());
            }
            order.settled_at = Some(Utc::now());
            self.apply_transition(
                tx,
                order,
                OrderStatus::Settled,
                "Settlement completed",
                ACTOR_SETTLEMENT,
            )?;
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!(order_id = %order_id, error = %e, "settlement failed");
        }
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Commit a status transition: one log record and the updated order in
    /// the given transaction, then publish after the commit.
    fn apply_transition(
        &self,
        mut tx: Tx<'_>,
        mut order: Order,
        to: OrderStatus,
        reason: &str,
        actor: &str,
    ) -> Result<Order, EngineError> {
        let from = order.status;
        if from.is_terminal() {
            return Err(EngineError::InvalidState { status: from });
        }
        let now = Utc::now();
        order.status = to;

        tx.append_log(OrderStateLog {
            order_id: order.id,
            from_status: Some(from),
            to_status: to,
            reason: reason.into(),
            logged_by: actor.into(),
            logged_at: now,
        });
        tx.put_order(order.clone());
        tx.commit()?;

        self.bus.publish(OrderUpdate {
            order_id: order.id,
            previous_status: Some(from),
            new_status: to,
            order: order.clone(),
        });
        tracing::debug!(
            order_id = %order.id,
            from = %from,
            to = %to,
            reason,
            "order transitioned"
        );
        Ok(order)
    }

    /// Absorb an infrastructure failure into a terminal `Rejected` state.
    /// Best-effort: a store that cannot even record the rejection only logs.
    fn reject_for_error(&self, order_id: OrderId, detail: &str) {
        let reason = format!("System error: {detail}");
        let result = (|| -> Result<(), EngineError> {
            let tx = self.store.begin()?;
            let Some(order) = tx.get_order(order_id) else {
                return Ok(());
            };
            if order.status.is_terminal() {
                return Ok(());
            }
            self.apply_transition(tx, order, OrderStatus::Rejected, &reason, ACTOR_WORKFLOW)?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!(
                order_id = %order_id,
                error = %e,
                "failed to record terminal rejection"
            );
        }
    }

    /// Run an operation, retrying transient store failures with exponential
    /// backoff, bounded by attempt count and the overall deadline.
    fn with_retries<T>(
        &self,
        deadline: Instant,
        mut op: impl FnMut() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut attempt = 0u32;
        loop {
            match op() {
                Err(EngineError::Store(e)) if e.is_transient() => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(EngineError::Store(e));
                    }
                    if Instant::now() + backoff >= deadline {
                        return Err(EngineError::Timeout);
                    }
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient store failure; retrying"
                    );
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(max_backoff);
                }
                other => return other,
            }
        }
    }
}

/// Whether a resubmission's payload differs from the order its key created.
fn payload_diverges(prior: &Order, request: &CreateOrderRequest) -> bool {
    prior.investor_id != request.investor_id
        || prior.asset_id != request.asset_id
        || prior.side != request.side
        || prior.quantity != request.quantity
        || prior.price != request.price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::{self, SettlementJob};
    use chrono::Utc;
    use oc_core::types::{AccountStatus, Investor};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        engine: OrderEngine,
        store: Arc<MemStore>,
        workflow_rx: crossbeam::channel::Receiver<OrderId>,
        settlement_rx: UnboundedReceiver<SettlementJob>,
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            workers: 1,
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            workflow_deadline_ms: 5_000,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemStore::in_memory());
        let (bus, _dispatcher) = EventBus::new();
        let (settlement, settlement_rx) = settlement::channel();
        let (workflow_tx, workflow_rx) = crossbeam::channel::unbounded();
        let engine = OrderEngine::new(
            store.clone(),
            bus,
            settlement,
            workflow_tx,
            engine_config(),
            Duration::from_secs(10),
        );
        Harness {
            engine,
            store,
            workflow_rx,
            settlement_rx,
        }
    }

    fn seed(store: &MemStore, investor_status: AccountStatus, asset_active: bool) {
        let mut tx = store.begin().unwrap();
        tx.put_investor(Investor {
            id: InvestorId(1),
            account_status: investor_status,
        });
        tx.put_asset(Asset {
            id: AssetId(10),
            is_active: asset_active,
            current_price: dec!(50.00),
        });
        tx.commit().unwrap();
    }

    fn buy_request(qty: Decimal, price: Option<Decimal>) -> CreateOrderRequest {
        CreateOrderRequest {
            investor_id: InvestorId(1),
            asset_id: AssetId(10),
            side: Side::Buy,
            quantity: qty,
            price,
        }
    }

    fn sell_request(qty: Decimal) -> CreateOrderRequest {
        CreateOrderRequest {
            side: Side::Sell,
            ..buy_request(qty, None)
        }
    }

    fn logged_path(store: &MemStore, order_id: OrderId) -> Vec<OrderStatus> {
        store
            .logs_for_order(order_id)
            .unwrap()
            .iter()
            .map(|l| l.to_status)
            .collect()
    }

    // ── Creation and idempotency ─────────────────────────────────────

    #[test]
    fn test_create_persists_new_order_and_enqueues() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(h.workflow_rx.try_recv().unwrap(), order.id);
        assert_eq!(logged_path(&h.store, order.id), vec![OrderStatus::New]);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
    }

    #[test]
    fn test_duplicate_key_returns_prior_order() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let first = h
            .engine
            .create_order(buy_request(dec!(2), None), Some("K1".into()))
            .unwrap();
        let second = h
            .engine
            .create_order(buy_request(dec!(2), None), Some("K1".into()))
            .unwrap();

        assert_eq!(first.id, second.id);
        // Only one order exists and only one workflow enqueue happened.
        assert_eq!(
            h.store.orders_for_investor(InvestorId(1), None).unwrap().len(),
            1
        );
        assert_eq!(h.workflow_rx.try_recv().unwrap(), first.id);
        assert!(h.workflow_rx.try_recv().is_err());
    }

    #[test]
    fn test_divergent_payload_still_returns_prior() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let first = h
            .engine
            .create_order(buy_request(dec!(2), None), Some("K1".into()))
            .unwrap();
        let second = h
            .engine
            .create_order(buy_request(dec!(9), Some(dec!(70))), Some("K1".into()))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, dec!(2));
    }

    #[test]
    fn test_missing_key_always_creates() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let a = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        let b = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        assert_ne!(a.id, b.id);
    }

    // ── Workflow: happy path ─────────────────────────────────────────

    #[test]
    fn test_happy_market_buy_fills_and_schedules_settlement() {
        let mut h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(order.id);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert!(stored.executed_at.is_some());
        assert_eq!(
            logged_path(&h.store, order.id),
            vec![
                OrderStatus::New,
                OrderStatus::Validating,
                OrderStatus::Validated,
                OrderStatus::Executing,
                OrderStatus::Filled,
            ]
        );

        // Trade at the asset's reference price.
        let trade = h.store.trade_for_order(order.id).unwrap().unwrap();
        assert_eq!(trade.quantity, dec!(2));
        assert_eq!(trade.execution_price, dec!(50.00));

        // Holding created.
        let holding = h
            .store
            .get_holding(InvestorId(1), AssetId(10))
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(2));
        assert_eq!(holding.average_cost, dec!(50.00));

        // Settlement scheduled at executed_at + delay.
        let job = h.settlement_rx.try_recv().unwrap();
        assert_eq!(job.order_id, order.id);
        assert_eq!(job.due_at, stored.executed_at.unwrap() + chrono::Duration::seconds(10));
    }

    #[test]
    fn test_limit_order_executes_at_limit_price() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h
            .engine
            .create_order(buy_request(dec!(2), Some(dec!(60.00))), None)
            .unwrap();
        h.engine.run_workflow(order.id);

        let trade = h.store.trade_for_order(order.id).unwrap().unwrap();
        assert_eq!(trade.execution_price, dec!(60.00));
    }

    #[test]
    fn test_weighted_average_across_two_buys() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let first = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(first.id);
        let second = h
            .engine
            .create_order(buy_request(dec!(2), Some(dec!(60.00))), None)
            .unwrap();
        h.engine.run_workflow(second.id);

        let holding = h
            .store
            .get_holding(InvestorId(1), AssetId(10))
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(4));
        assert_eq!(holding.average_cost, dec!(55.00));
    }

    #[test]
    fn test_sell_to_zero_deletes_holding() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let buy = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(buy.id);
        let sell = h.engine.create_order(sell_request(dec!(2)), None).unwrap();
        h.engine.run_workflow(sell.id);

        let stored = h.store.get_order(sell.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert!(h
            .store
            .get_holding(InvestorId(1), AssetId(10))
            .unwrap()
            .is_none());
    }

    // ── Workflow: rejections ─────────────────────────────────────────

    #[test]
    fn test_oversell_rejects_with_reason_and_no_trade() {
        let mut h = harness();
        seed(&h.store, AccountStatus::Active, true);
        let mut tx = h.store.begin().unwrap();
        tx.put_holding(Holding {
            investor_id: InvestorId(1),
            asset_id: AssetId(10),
            quantity: dec!(1),
            average_cost: dec!(50.00),
            updated_at: Utc::now(),
        });
        tx.commit().unwrap();

        let order = h.engine.create_order(sell_request(dec!(2)), None).unwrap();
        h.engine.run_workflow(order.id);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Rejected);
        assert_eq!(
            logged_path(&h.store, order.id),
            vec![OrderStatus::New, OrderStatus::Validating, OrderStatus::Rejected]
        );
        let logs = h.store.logs_for_order(order.id).unwrap();
        assert_eq!(
            logs.last().unwrap().reason,
            "Insufficient holdings. Available: 1, Requested: 2"
        );

        assert!(h.store.trade_for_order(order.id).unwrap().is_none());
        let holding = h
            .store
            .get_holding(InvestorId(1), AssetId(10))
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(1));
        assert!(h.settlement_rx.try_recv().is_err());
    }

    #[test]
    fn test_inactive_asset_rejects_market_buy() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, false);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(order.id);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Rejected);
        let logs = h.store.logs_for_order(order.id).unwrap();
        assert_eq!(
            logs.last().unwrap().reason,
            "Asset is not available for trading"
        );
    }

    #[test]
    fn test_suspended_investor_rejects() {
        let h = harness();
        seed(&h.store, AccountStatus::Suspended, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(order.id);

        let logs = h.store.logs_for_order(order.id).unwrap();
        assert_eq!(logs.last().unwrap().reason, "Account is Suspended");
    }

    // ── Cancellation ─────────────────────────────────────────────────

    #[test]
    fn test_cancel_new_order_then_worker_emits_nothing() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        let cancelled = h
            .engine
            .cancel_order(order.id, "changed my mind")
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // The worker picks the order up afterwards and must stay silent.
        h.engine.run_workflow(order.id);

        assert_eq!(
            logged_path(&h.store, order.id),
            vec![OrderStatus::New, OrderStatus::Cancelled]
        );
        assert!(h.store.trade_for_order(order.id).unwrap().is_none());
    }

    #[test]
    fn test_cancel_filled_order_is_invalid_state() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(order.id);

        let err = h.engine.cancel_order(order.id, "too late").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                status: OrderStatus::Filled
            }
        ));
    }

    #[test]
    fn test_cancel_unknown_order_is_not_found() {
        let h = harness();
        let err = h
            .engine
            .cancel_order(OrderId::generate(), "nope")
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    // ── Settlement ───────────────────────────────────────────────────

    #[test]
    fn test_settle_due_transitions_filled_order() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.run_workflow(order.id);
        h.engine.settle_due(order.id);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Settled);
        assert!(stored.settled_at.is_some());
        assert_eq!(
            logged_path(&h.store, order.id).last(),
            Some(&OrderStatus::Settled)
        );
    }

    #[test]
    fn test_settle_due_is_noop_for_non_filled() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let order = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();
        h.engine.settle_due(order.id);

        let stored = h.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert_eq!(logged_path(&h.store, order.id), vec![OrderStatus::New]);
    }

    #[test]
    fn test_settle_due_unknown_order_is_silent() {
        let h = harness();
        h.engine.settle_due(OrderId::generate());
    }

    // ── Reads ────────────────────────────────────────────────────────

    #[test]
    fn test_list_orders_newest_first() {
        let h = harness();
        seed(&h.store, AccountStatus::Active, true);

        let first = h.engine.create_order(buy_request(dec!(1), None), None).unwrap();
        let second = h.engine.create_order(buy_request(dec!(2), None), None).unwrap();

        let orders = h
            .engine
            .list_orders_for_investor(InvestorId(1), None)
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].ordered_at >= orders[1].ordered_at);
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }
}
