//! Append-only audit record of order status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OrderId;
use super::order::OrderStatus;

/// One status transition of one order.
///
/// Written inside the same transaction that performs the transition. For
/// each order the records form a path through the state machine, beginning
/// with `(None -> New)` at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStateLog {
    /// The transitioning order.
    pub order_id: OrderId,
    /// Previous status; `None` for the creation record.
    pub from_status: Option<OrderStatus>,
    /// New status.
    pub to_status: OrderStatus,
    /// Why the transition happened (validation reason, cancel reason, ...).
    pub reason: String,
    /// Which actor performed the transition.
    pub logged_by: String,
    /// When the transition was recorded.
    pub logged_at: DateTime<Utc>,
}
