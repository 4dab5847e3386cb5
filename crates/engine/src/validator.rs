//! Order admission checks.
//!
//! Every order passes through a fixed sequence of checks before execution.
//! The first check that fails short-circuits evaluation; its reason is
//! recorded verbatim in the state log and surfaced to the client through
//! the `Rejected` status.

use rust_decimal::Decimal;

use oc_core::types::market::Asset;
use oc_core::types::{AccountStatus, Holding, Investor, Order, Side};

/// Reason an order failed admission.
///
/// The `Display` form is the client-visible rejection reason; wording is
/// part of the API contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The referenced investor does not exist.
    #[error("Investor not found")]
    InvestorNotFound,
    /// The investor's account is not in good standing.
    #[error("Account is {0}")]
    AccountNotActive(AccountStatus),
    /// The asset does not exist or is closed for trading.
    #[error("Asset is not available for trading")]
    AssetUnavailable,
    /// Non-positive order quantity.
    #[error("Quantity must be positive")]
    NonPositiveQuantity,
    /// Non-positive limit price.
    #[error("Price must be positive")]
    NonPositivePrice,
    /// The investor holds less of the asset than the sell requests.
    #[error("Insufficient holdings. Available: {available}, Requested: {requested}")]
    InsufficientHoldings {
        available: Decimal,
        requested: Decimal,
    },
    /// A market order against an asset with no usable reference price.
    #[error("Invalid market price for asset")]
    InvalidMarketPrice,
}

/// Run the admission checks, in order, against a snapshot of the order's
/// collaborators. Does not mutate anything.
///
/// The holdings check here is advisory: execution re-checks sufficiency
/// inside its own transaction.
pub fn validate(
    order: &Order,
    investor: Option<&Investor>,
    asset: Option<&Asset>,
    holding: Option<&Holding>,
) -> Result<(), ValidationError> {
    // 1. Investor exists and is active.
    let investor = investor.ok_or(ValidationError::InvestorNotFound)?;
    if investor.account_status != AccountStatus::Active {
        return Err(ValidationError::AccountNotActive(investor.account_status));
    }

    // 2. Asset exists and is open for trading.
    let asset = match asset {
        Some(a) if a.is_active => a,
        _ => return Err(ValidationError::AssetUnavailable),
    };

    // 3. Positive quantity; positive price when present.
    if order.quantity <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity);
    }
    if let Some(price) = order.price {
        if price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice);
        }
    }

    // 4. Sells require sufficient holdings.
    if order.side == Side::Sell {
        let available = holding.map(|h| h.quantity).unwrap_or(Decimal::ZERO);
        if available < order.quantity {
            return Err(ValidationError::InsufficientHoldings {
                available: available.normalize(),
                requested: order.quantity.normalize(),
            });
        }
    }

    // 5. Market orders need a usable reference price.
    if order.is_market() && asset.current_price <= Decimal::ZERO {
        return Err(ValidationError::InvalidMarketPrice);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oc_core::types::{AssetId, InvestorId, OrderId, OrderStatus};
    use rust_decimal_macros::dec;

    fn investor(status: AccountStatus) -> Investor {
        Investor {
            id: InvestorId(1),
            account_status: status,
        }
    }

    fn asset(active: bool, price: Decimal) -> Asset {
        Asset {
            id: AssetId(10),
            is_active: active,
            current_price: price,
        }
    }

    fn holding(qty: Decimal) -> Holding {
        Holding {
            investor_id: InvestorId(1),
            asset_id: AssetId(10),
            quantity: qty,
            average_cost: dec!(50),
            updated_at: Utc::now(),
        }
    }

    fn order(side: Side, qty: Decimal, price: Option<Decimal>) -> Order {
        Order {
            id: OrderId::generate(),
            investor_id: InvestorId(1),
            asset_id: AssetId(10),
            side,
            quantity: qty,
            price,
            status: OrderStatus::Validating,
            idempotency_key: None,
            ordered_at: Utc::now(),
            executed_at: None,
            settled_at: None,
        }
    }

    #[test]
    fn test_happy_market_buy() {
        let o = order(Side::Buy, dec!(2), None);
        let result = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_investor() {
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(&o, None, Some(&asset(true, dec!(50))), None).unwrap_err();
        assert_eq!(err.to_string(), "Investor not found");
    }

    #[test]
    fn test_suspended_account() {
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Suspended)),
            Some(&asset(true, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Account is Suspended");
    }

    #[test]
    fn test_closed_account() {
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Closed)),
            Some(&asset(true, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Account is Closed");
    }

    #[test]
    fn test_inactive_asset() {
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(false, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Asset is not available for trading");
    }

    #[test]
    fn test_missing_asset() {
        let o = order(Side::Buy, dec!(2), None);
        let err =
            validate(&o, Some(&investor(AccountStatus::Active)), None, None).unwrap_err();
        assert_eq!(err, ValidationError::AssetUnavailable);
    }

    #[test]
    fn test_zero_quantity() {
        let o = order(Side::Buy, dec!(0), Some(dec!(50)));
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveQuantity);
    }

    #[test]
    fn test_negative_price() {
        let o = order(Side::Buy, dec!(2), Some(dec!(-1)));
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NonPositivePrice);
    }

    #[test]
    fn test_oversell_message() {
        let o = order(Side::Sell, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            Some(&holding(dec!(1))),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient holdings. Available: 1, Requested: 2"
        );
    }

    #[test]
    fn test_sell_with_no_holding() {
        let o = order(Side::Sell, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient holdings. Available: 0, Requested: 2"
        );
    }

    #[test]
    fn test_sell_exact_holding_passes() {
        let o = order(Side::Sell, dec!(2), None);
        let result = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(50))),
            Some(&holding(dec!(2))),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_market_order_needs_reference_price() {
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(0))),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid market price for asset");
    }

    #[test]
    fn test_limit_order_ignores_zero_reference_price() {
        let o = order(Side::Buy, dec!(2), Some(dec!(45)));
        let result = validate(
            &o,
            Some(&investor(AccountStatus::Active)),
            Some(&asset(true, dec!(0))),
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_first_failure_wins() {
        // Suspended account and inactive asset: the account check fires first.
        let o = order(Side::Buy, dec!(2), None);
        let err = validate(
            &o,
            Some(&investor(AccountStatus::Suspended)),
            Some(&asset(false, dec!(0))),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::AccountNotActive(_)));
    }
}
