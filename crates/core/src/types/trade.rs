//! Trade entity — the record of one executed order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InvestorId, OrderId, TradeId};
use super::order::Side;

/// One trade per successfully executed order (1:1 with a filled order).
///
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Globally unique trade identifier.
    pub id: TradeId,
    /// The order this trade fills.
    pub order_id: OrderId,
    /// Owning investor.
    pub investor_id: InvestorId,
    /// Traded asset.
    pub asset_id: AssetId,
    /// Buy or sell.
    pub side: Side,
    /// Executed quantity (equals the order quantity).
    pub quantity: Decimal,
    /// Price the trade executed at: the order's limit price, or the asset's
    /// reference price at execution time for market orders.
    pub execution_price: Decimal,
    /// When the trade executed.
    pub traded_at: DateTime<Utc>,
}
