//! Core types for the ordercore platform.
//!
//! Entities reference each other by id only; hydrated views (order plus
//! investor plus asset) are assembled at the API boundary, never stored.
//! All monetary and quantity arithmetic uses [`rust_decimal::Decimal`].

pub mod holding;
pub mod ids;
pub mod market;
pub mod order;
pub mod state_log;
pub mod trade;

// Re-export primary types for convenient access via `oc_core::types::*`.
pub use holding::Holding;
pub use ids::{AssetId, InvestorId, OrderId, TradeId};
pub use market::{AccountStatus, Asset, Investor};
pub use order::{IdempotencyRecord, Order, OrderStatus, Side};
pub use state_log::OrderStateLog;
pub use trade::Trade;
