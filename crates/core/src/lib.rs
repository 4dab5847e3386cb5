//! # oc-core
//!
//! Shared types, configuration, and logging for the ordercore order
//! management platform.
//!
//! This crate provides the foundational building blocks used across all other
//! crates in the workspace: entity definitions (orders, trades, holdings),
//! the order status state machine, layered configuration, and the logging
//! framework.

pub mod config;
pub mod logging;
pub mod types;
