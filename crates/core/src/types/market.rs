//! External reference entities: investors and assets.
//!
//! Both are owned by external systems. The engine only ever reads them.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InvestorId};

/// Lifecycle status of an investor account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Account in good standing; may trade.
    Active,
    /// Temporarily barred from trading.
    Suspended,
    /// Permanently closed.
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "Active"),
            AccountStatus::Suspended => write!(f, "Suspended"),
            AccountStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// An investor account, read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investor {
    /// External account identifier.
    pub id: InvestorId,
    /// Current account status.
    pub account_status: AccountStatus,
}

/// A tradable asset, read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// External asset identifier.
    pub id: AssetId,
    /// Whether the asset is currently open for trading.
    pub is_active: bool,
    /// Cached reference price used to fill market orders.
    pub current_price: Decimal,
}
