//! In-memory entity store with transactional commit and journal-backed
//! durability.
//!
//! All tables live behind a single `parking_lot` mutex; a transaction holds
//! the lock for its whole (short) lifetime, which serializes commits and
//! gives every transaction a stable view. In particular, two concurrent
//! sells against the same holding can never both observe the pre-decrement
//! quantity. Lock acquisition is bounded; a timeout surfaces as
//! [`StoreError::Transient`] so callers can retry with backoff.
//!
//! Writes are staged on the transaction and applied atomically on commit;
//! dropping the transaction without committing discards them. When a
//! journal is configured, the staged batch is appended to disk before it is
//! applied, so a commit either reaches both the journal and memory or
//! neither.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

use oc_core::types::market::Asset;
use oc_core::types::{
    AssetId, Holding, IdempotencyRecord, Investor, InvestorId, Order, OrderId, OrderStateLog,
    OrderStatus, Trade, TradeId,
};

use crate::error::StoreError;
use crate::wal::{Journal, JournalOp, JournalRecord};

/// Committed entity tables.
#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    trades: HashMap<TradeId, Trade>,
    trades_by_order: HashMap<OrderId, TradeId>,
    holdings: HashMap<(InvestorId, AssetId), Holding>,
    state_logs: Vec<OrderStateLog>,
    idempotency: HashMap<String, IdempotencyRecord>,
    investors: HashMap<InvestorId, Investor>,
    assets: HashMap<AssetId, Asset>,
}

impl Tables {
    /// Apply one committed mutation. Shared between commit and replay.
    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::PutOrder(order) => {
                self.orders.insert(order.id, order);
            }
            JournalOp::PutTrade(trade) => {
                self.trades_by_order.insert(trade.order_id, trade.id);
                self.trades.insert(trade.id, trade);
            }
            JournalOp::PutHolding(holding) => {
                self.holdings
                    .insert((holding.investor_id, holding.asset_id), holding);
            }
            JournalOp::DeleteHolding {
                investor_id,
                asset_id,
            } => {
                self.holdings.remove(&(investor_id, asset_id));
            }
            JournalOp::AppendLog(log) => {
                self.state_logs.push(log);
            }
            JournalOp::PutIdempotency(record) => {
                self.idempotency.insert(record.key.clone(), record);
            }
            JournalOp::PutInvestor(investor) => {
                self.investors.insert(investor.id, investor);
            }
            JournalOp::PutAsset(asset) => {
                self.assets.insert(asset.id, asset);
            }
        }
    }
}

struct State {
    tables: Tables,
    journal: Option<Journal>,
    next_seq: u64,
}

/// The in-memory store.
pub struct MemStore {
    state: Mutex<State>,
    lock_timeout: Duration,
}

impl MemStore {
    /// Create a store with no journal; state is lost on drop.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(State {
                tables: Tables::default(),
                journal: None,
                next_seq: 1,
            }),
            lock_timeout: Duration::from_secs(1),
        }
    }

    /// Open a journal-backed store, replaying any existing records.
    pub fn open(journal_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = journal_path.into();
        let records = Journal::replay(&path)?;
        let mut tables = Tables::default();
        let mut next_seq = 1;
        for record in records {
            next_seq = record.seq + 1;
            for op in record.ops {
                tables.apply(op);
            }
        }
        let journal = Journal::open(&path)?;
        tracing::info!(path = %path.display(), next_seq, "store journal opened");

        Ok(Self {
            state: Mutex::new(State {
                tables,
                journal: Some(journal),
                next_seq,
            }),
            lock_timeout: Duration::from_secs(1),
        })
    }

    /// Override the bounded lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| StoreError::Transient("store lock acquisition timed out".into()))
    }

    /// Begin a transaction. Holds the store lock until commit or drop.
    pub fn begin(&self) -> Result<Tx<'_>, StoreError> {
        Ok(Tx {
            state: self.lock()?,
            staged: Vec::new(),
        })
    }

    // ── Read-only snapshot helpers ─────────────────────────────────────

    /// Fetch one order by id.
    pub fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock()?.tables.orders.get(&id).cloned())
    }

    /// All orders of one investor, newest first, optionally bounded below
    /// by `from`.
    pub fn orders_for_investor(
        &self,
        investor_id: InvestorId,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Order>, StoreError> {
        let guard = self.lock()?;
        let mut orders: Vec<Order> = guard
            .tables
            .orders
            .values()
            .filter(|o| o.investor_id == investor_id)
            .filter(|o| from.map_or(true, |f| o.ordered_at >= f))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));
        Ok(orders)
    }

    /// The trade that filled the given order, if any.
    pub fn trade_for_order(&self, order_id: OrderId) -> Result<Option<Trade>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .trades_by_order
            .get(&order_id)
            .and_then(|tid| guard.tables.trades.get(tid))
            .cloned())
    }

    /// One investor's holding in one asset.
    pub fn get_holding(
        &self,
        investor_id: InvestorId,
        asset_id: AssetId,
    ) -> Result<Option<Holding>, StoreError> {
        Ok(self
            .lock()?
            .tables
            .holdings
            .get(&(investor_id, asset_id))
            .cloned())
    }

    /// All holdings of one investor, ordered by asset id.
    pub fn holdings_for_investor(
        &self,
        investor_id: InvestorId,
    ) -> Result<Vec<Holding>, StoreError> {
        let guard = self.lock()?;
        let mut holdings: Vec<Holding> = guard
            .tables
            .holdings
            .values()
            .filter(|h| h.investor_id == investor_id)
            .cloned()
            .collect();
        holdings.sort_by_key(|h| h.asset_id);
        Ok(holdings)
    }

    /// Fetch one investor by id.
    pub fn get_investor(&self, id: InvestorId) -> Result<Option<Investor>, StoreError> {
        Ok(self.lock()?.tables.investors.get(&id).cloned())
    }

    /// Fetch one asset by id.
    pub fn get_asset(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.lock()?.tables.assets.get(&id).cloned())
    }

    /// All state-log records of one order, in append order.
    pub fn logs_for_order(&self, order_id: OrderId) -> Result<Vec<OrderStateLog>, StoreError> {
        Ok(self
            .lock()?
            .tables
            .state_logs
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    /// Orders whose workflow is still in flight (neither terminal nor
    /// awaiting settlement). Used by startup recovery to re-enqueue work.
    pub fn pending_workflow_orders(&self) -> Result<Vec<Order>, StoreError> {
        let guard = self.lock()?;
        let mut orders: Vec<Order> = guard
            .tables
            .orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.status != OrderStatus::Filled)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.ordered_at.cmp(&b.ordered_at));
        Ok(orders)
    }

    /// Filled orders that have not settled yet. Used by the settlement
    /// scheduler to reconstruct pending jobs after a restart.
    pub fn filled_unsettled_orders(&self) -> Result<Vec<Order>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Filled && o.settled_at.is_none())
            .cloned()
            .collect())
    }
}

/// An open transaction.
///
/// Reads observe committed state overlaid with this transaction's staged
/// writes. [`Tx::commit`] applies the staged batch atomically; dropping the
/// transaction rolls it back.
pub struct Tx<'a> {
    state: MutexGuard<'a, State>,
    staged: Vec<JournalOp>,
}

impl Tx<'_> {
    // ── Reads (committed state + staged overlay) ───────────────────────

    /// Fetch one order by id.
    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        for op in self.staged.iter().rev() {
            if let JournalOp::PutOrder(o) = op {
                if o.id == id {
                    return Some(o.clone());
                }
            }
        }
        self.state.tables.orders.get(&id).cloned()
    }

    /// The trade that filled the given order, if any.
    pub fn get_trade_for_order(&self, order_id: OrderId) -> Option<Trade> {
        for op in self.staged.iter().rev() {
            if let JournalOp::PutTrade(t) = op {
                if t.order_id == order_id {
                    return Some(t.clone());
                }
            }
        }
        self.state
            .tables
            .trades_by_order
            .get(&order_id)
            .and_then(|tid| self.state.tables.trades.get(tid))
            .cloned()
    }

    /// One investor's holding in one asset.
    pub fn get_holding(&self, investor_id: InvestorId, asset_id: AssetId) -> Option<Holding> {
        for op in self.staged.iter().rev() {
            match op {
                JournalOp::PutHolding(h)
                    if h.investor_id == investor_id && h.asset_id == asset_id =>
                {
                    return Some(h.clone());
                }
                JournalOp::DeleteHolding {
                    investor_id: i,
                    asset_id: a,
                } if *i == investor_id && *a == asset_id => {
                    return None;
                }
                _ => {}
            }
        }
        self.state
            .tables
            .holdings
            .get(&(investor_id, asset_id))
            .cloned()
    }

    /// Look up an idempotency mapping by normalized key.
    pub fn get_idempotency(&self, key: &str) -> Option<IdempotencyRecord> {
        for op in self.staged.iter().rev() {
            if let JournalOp::PutIdempotency(r) = op {
                if r.key == key {
                    return Some(r.clone());
                }
            }
        }
        self.state.tables.idempotency.get(key).cloned()
    }

    /// Fetch one investor by id.
    pub fn get_investor(&self, id: InvestorId) -> Option<Investor> {
        for op in self.staged.iter().rev() {
            if let JournalOp::PutInvestor(i) = op {
                if i.id == id {
                    return Some(i.clone());
                }
            }
        }
        self.state.tables.investors.get(&id).cloned()
    }

    /// Fetch one asset by id.
    pub fn get_asset(&self, id: AssetId) -> Option<Asset> {
        for op in self.staged.iter().rev() {
            if let JournalOp::PutAsset(a) = op {
                if a.id == id {
                    return Some(a.clone());
                }
            }
        }
        self.state.tables.assets.get(&id).cloned()
    }

    // ── Writes (staged until commit) ───────────────────────────────────

    /// Insert or update an order.
    pub fn put_order(&mut self, order: Order) {
        self.staged.push(JournalOp::PutOrder(order));
    }

    /// Insert a trade.
    pub fn put_trade(&mut self, trade: Trade) {
        self.staged.push(JournalOp::PutTrade(trade));
    }

    /// Insert or update a holding.
    pub fn put_holding(&mut self, holding: Holding) {
        self.staged.push(JournalOp::PutHolding(holding));
    }

    /// Delete a holding.
    pub fn delete_holding(&mut self, investor_id: InvestorId, asset_id: AssetId) {
        self.staged.push(JournalOp::DeleteHolding {
            investor_id,
            asset_id,
        });
    }

    /// Append a state-log record.
    pub fn append_log(&mut self, log: OrderStateLog) {
        self.staged.push(JournalOp::AppendLog(log));
    }

    /// Record an idempotency mapping.
    ///
    /// Fails with [`StoreError::Conflict`] if the key is already mapped,
    /// the in-store equivalent of a unique-constraint violation.
    pub fn put_idempotency(&mut self, record: IdempotencyRecord) -> Result<(), StoreError> {
        if self.get_idempotency(&record.key).is_some() {
            return Err(StoreError::Conflict(format!(
                "idempotency key already mapped: {}",
                record.key
            )));
        }
        self.staged.push(JournalOp::PutIdempotency(record));
        Ok(())
    }

    /// Insert or update an investor (seeding / external sync).
    pub fn put_investor(&mut self, investor: Investor) {
        self.staged.push(JournalOp::PutInvestor(investor));
    }

    /// Insert or update an asset (seeding / external sync).
    pub fn put_asset(&mut self, asset: Asset) {
        self.staged.push(JournalOp::PutAsset(asset));
    }

    // ── Outcome ────────────────────────────────────────────────────────

    /// Commit the staged batch atomically.
    ///
    /// With a journal configured, the batch is appended to disk first; a
    /// journal failure leaves the in-memory state untouched.
    pub fn commit(mut self) -> Result<(), StoreError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let seq = self.state.next_seq;
        let record = JournalRecord {
            seq,
            ops: std::mem::take(&mut self.staged),
        };
        if let Some(journal) = self.state.journal.as_mut() {
            journal.append(&record)?;
        }
        for op in record.ops {
            self.state.tables.apply(op);
        }
        self.state.next_seq = seq + 1;
        Ok(())
    }

    /// Discard the staged batch. Equivalent to dropping the transaction.
    pub fn rollback(self) {}
}
