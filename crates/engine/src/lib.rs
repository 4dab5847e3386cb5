//! # oc-engine
//!
//! Order lifecycle engine for the ordercore platform. Owns the order state
//! machine and drives every order from admission through validation,
//! execution, and deferred settlement, publishing each transition to
//! per-investor subscribers after the owning transaction commits.

pub mod bus;
pub mod engine;
pub mod holdings;
pub mod idempotency;
pub mod settlement;
pub mod validator;
pub mod worker;

pub use bus::{EventBus, EventDispatcher, OrderUpdate};
pub use engine::{CreateOrderRequest, EngineError, OrderEngine};
pub use settlement::SettlementHandle;
pub use validator::ValidationError;
pub use worker::WorkflowPool;
