//! Entity identifiers.
//!
//! Orders and trades carry globally unique UUIDs; investors and assets are
//! owned by external systems and referenced by their numeric ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Generate a fresh random order id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    /// Generate a fresh random trade id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an investor account (owned by an external system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvestorId(pub i64);

impl fmt::Display for InvestorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tradable asset (owned by an external system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub i64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_ids_are_unique() {
        let mut set = HashSet::new();
        for _ in 0..100 {
            set.insert(OrderId::generate());
        }
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn test_numeric_id_display() {
        assert_eq!(format!("{}", InvestorId(7)), "7");
        assert_eq!(format!("{}", AssetId(10)), "10");
    }

    #[test]
    fn test_numeric_ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&InvestorId(42)).unwrap();
        assert_eq!(json, "42");
        let back: InvestorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InvestorId(42));
    }
}
