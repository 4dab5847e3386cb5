//! Holdings mutation for filled orders.
//!
//! Applies a fill to the investor's position inside the execution
//! transaction. Buys accumulate quantity and track the weighted-average
//! acquisition cost; sells decrement quantity and leave the average cost
//! untouched. Average cost is kept to [`COST_SCALE`] decimal places using
//! banker's rounding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use oc_core::types::{AssetId, Holding, InvestorId};

use crate::validator::ValidationError;

/// Decimal places kept for the weighted-average cost.
pub const COST_SCALE: u32 = 8;

/// Apply a buy fill to an existing holding (or create one).
pub fn apply_buy(
    holding: Option<Holding>,
    investor_id: InvestorId,
    asset_id: AssetId,
    quantity: Decimal,
    execution_price: Decimal,
    now: DateTime<Utc>,
) -> Holding {
    match holding {
        None => Holding {
            investor_id,
            asset_id,
            quantity,
            average_cost: execution_price,
            updated_at: now,
        },
        Some(held) => {
            let new_quantity = held.quantity + quantity;
            let total_cost = held.quantity * held.average_cost + quantity * execution_price;
            let new_average = (total_cost / new_quantity).round_dp(COST_SCALE);
            Holding {
                quantity: new_quantity,
                average_cost: new_average,
                updated_at: now,
                ..held
            }
        }
    }
}

/// Apply a sell fill to a holding.
///
/// Sufficiency is re-checked here: the validator's earlier check was only
/// advisory, and concurrent sells must not drive the quantity negative.
/// Returns `Ok(None)` when the position is fully closed (the caller deletes
/// the record).
pub fn apply_sell(
    holding: Option<Holding>,
    quantity: Decimal,
    now: DateTime<Utc>,
) -> Result<Option<Holding>, ValidationError> {
    let held = holding.ok_or(ValidationError::InsufficientHoldings {
        available: Decimal::ZERO,
        requested: quantity.normalize(),
    })?;
    if held.quantity < quantity {
        return Err(ValidationError::InsufficientHoldings {
            available: held.quantity.normalize(),
            requested: quantity.normalize(),
        });
    }

    let remaining = held.quantity - quantity;
    if remaining.is_zero() {
        return Ok(None);
    }
    Ok(Some(Holding {
        quantity: remaining,
        updated_at: now,
        ..held
    }))
}
