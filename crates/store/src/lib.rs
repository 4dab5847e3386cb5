//! # oc-store
//!
//! Transactional entity store for the ordercore platform.
//!
//! [`MemStore`] keeps all entities in memory behind a single lock and
//! optionally journals every committed transaction to an append-only
//! JSON-lines file, replayed on open. Transactions stage their writes and
//! apply them atomically on commit; dropping a transaction rolls it back.

pub mod error;
pub mod mem;
pub mod wal;

pub use error::StoreError;
pub use mem::{MemStore, Tx};
pub use wal::{Journal, JournalOp, JournalRecord};
