//! Idempotent order admission.
//!
//! Maps client-supplied idempotency keys to the orders they created, so a
//! retried submission yields the original order instead of a duplicate.
//! Reservation happens inside the order-creation transaction; the store's
//! unique constraint on the key backs the registry up against races.

use uuid::Uuid;

use oc_core::types::OrderId;
use oc_store::Tx;

/// Outcome of an idempotency reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The key is unused; the caller must create the order and record the
    /// mapping within the same transaction.
    Created,
    /// The key is already mapped; the caller returns the prior order as-is.
    Existing(OrderId),
}

/// Normalize a client key.
///
/// Keys are opaque strings; values parseable as UUIDs are canonicalized
/// (lowercase, hyphenated) so that equivalent spellings collide.
pub fn normalize_key(raw: &str) -> String {
    match Uuid::parse_str(raw.trim()) {
        Ok(uuid) => uuid.hyphenated().to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Reserve a normalized key within the given transaction.
pub fn reserve(tx: &Tx<'_>, key: &str) -> Reservation {
    match tx.get_idempotency(key) {
        Some(record) => Reservation::Existing(record.order_id),
        None => Reservation::Created,
    }
}
