//! Order entity and its lifecycle state machine.
//!
//! Every order moves through a deterministic state machine from creation
//! (`New`) to one of the terminal states (`Settled`, `Rejected`,
//! `Cancelled`). The legal transitions are encoded in
//! [`OrderStatus::can_transition`]; callers must consult it before mutating
//! an order's status.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InvestorId, OrderId};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy: acquire the asset, increasing the holding.
    Buy,
    /// Sell: dispose of the asset, decreasing the holding.
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order states in the lifecycle.
///
/// The serialized form is the case-sensitive wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted and durably persisted, not yet picked up by a worker.
    New,
    /// A worker is running admission checks.
    Validating,
    /// Admission checks passed.
    Validated,
    /// Trade execution in progress.
    Executing,
    /// Trade executed and holdings updated; awaiting settlement.
    Filled,
    /// Settlement completed; terminal state.
    Settled,
    /// Rejected by validation or execution failure; terminal state.
    Rejected,
    /// Cancelled by the investor; terminal state.
    Cancelled,
}

impl OrderStatus {
    /// Returns `true` if this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Rejected | Self::Cancelled)
    }

    /// Returns `true` if an order in this status may still be cancelled.
    ///
    /// Cancellation is only accepted before execution begins.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::New | Self::Validated)
    }

    /// Returns `true` if `from -> to` is a legal lifecycle transition.
    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::New, OrderStatus::Validating)
                | (OrderStatus::New, OrderStatus::Cancelled)
                | (OrderStatus::Validating, OrderStatus::Validated)
                | (OrderStatus::Validating, OrderStatus::Rejected)
                | (OrderStatus::Validated, OrderStatus::Executing)
                | (OrderStatus::Validated, OrderStatus::Cancelled)
                | (OrderStatus::Executing, OrderStatus::Filled)
                | (OrderStatus::Executing, OrderStatus::Rejected)
                | (OrderStatus::Filled, OrderStatus::Settled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Validating => "VALIDATING",
            OrderStatus::Validated => "VALIDATED",
            OrderStatus::Executing => "EXECUTING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Settled => "SETTLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// An investor's instruction to buy or sell an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Globally unique order identifier.
    pub id: OrderId,
    /// Owning investor.
    pub investor_id: InvestorId,
    /// Asset being traded.
    pub asset_id: AssetId,
    /// Buy or sell.
    pub side: Side,
    /// Ordered quantity. Positive; minimum 0.0001.
    pub quantity: Decimal,
    /// Limit price. `None` means a market order, filled at the asset's
    /// current reference price.
    pub price: Option<Decimal>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Client-supplied idempotency token, unique across orders when present.
    pub idempotency_key: Option<String>,
    /// When the order was accepted.
    pub ordered_at: DateTime<Utc>,
    /// When the trade executed. Set together with the `Filled` transition.
    pub executed_at: Option<DateTime<Utc>>,
    /// When settlement completed. Set together with the `Settled` transition.
    pub settled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns `true` if this is a market order (no limit price).
    pub fn is_market(&self) -> bool {
        self.price.is_none()
    }
}

/// Maps a client idempotency key to the order it created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    /// Normalized client key.
    pub key: String,
    /// The order created by the first submission carrying this key.
    pub order_id: OrderId,
    /// When the mapping was recorded.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 8] = [
        OrderStatus::New,
        OrderStatus::Validating,
        OrderStatus::Validated,
        OrderStatus::Executing,
        OrderStatus::Filled,
        OrderStatus::Settled,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            OrderStatus::New,
            OrderStatus::Validating,
            OrderStatus::Validated,
            OrderStatus::Executing,
            OrderStatus::Filled,
            OrderStatus::Settled,
        ];
        for pair in path.windows(2) {
            assert!(
                OrderStatus::can_transition(pair[0], pair[1]),
                "{:?} -> {:?} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL {
            if !from.is_terminal() {
                continue;
            }
            for to in ALL {
                assert!(
                    !OrderStatus::can_transition(from, to),
                    "terminal {:?} must not transition to {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_cancel_only_from_new_and_validated() {
        for from in ALL {
            let legal = OrderStatus::can_transition(from, OrderStatus::Cancelled);
            assert_eq!(legal, from.is_cancellable(), "from {:?}", from);
        }
    }

    #[test]
    fn test_reject_only_from_validating_and_executing() {
        for from in ALL {
            let legal = OrderStatus::can_transition(from, OrderStatus::Rejected);
            let expected =
                matches!(from, OrderStatus::Validating | OrderStatus::Executing);
            assert_eq!(legal, expected, "from {:?}", from);
        }
    }

    #[test]
    fn test_no_status_repeats() {
        for s in ALL {
            assert!(!OrderStatus::can_transition(s, s));
        }
    }

    #[test]
    fn test_settled_only_from_filled() {
        for from in ALL {
            let legal = OrderStatus::can_transition(from, OrderStatus::Settled);
            assert_eq!(legal, from == OrderStatus::Filled, "from {:?}", from);
        }
    }

    #[test]
    fn test_wire_vocabulary() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Validating).unwrap(),
            "\"VALIDATING\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
        let side: Side = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(side, Side::Buy);
    }

    #[test]
    fn test_display_matches_wire_form() {
        for s in ALL {
            let wire = serde_json::to_string(&s).unwrap();
            assert_eq!(wire, format!("\"{s}\""));
        }
    }
}
