//! Holding entity — an investor's position in one asset.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InvestorId};

/// Per-(investor, asset) position with quantity and weighted-average cost.
///
/// `quantity` is never negative. A position reduced to zero is deleted by
/// the engine, but readers must also tolerate retained zero-quantity rows
/// (e.g. from replayed journals written by other producers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Owning investor.
    pub investor_id: InvestorId,
    /// Held asset.
    pub asset_id: AssetId,
    /// Held quantity, non-negative.
    pub quantity: Decimal,
    /// Weighted-average acquisition cost. Meaningless when `quantity` is zero.
    pub average_cost: Decimal,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}
