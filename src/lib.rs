//! TideMQ – the in-broker delivery core of a publish/subscribe server.
//!
//! This crate exports
//!  * `core`    – messages, subscriptions, the flow-controlled topic delivery
//!                engine, publisher channels and retained-message replay
//!  * `broker`  – the subscription lifecycle bridge and ack/nack routing
//!  * `config`  – TOML-driven runtime configuration
//!  * `logging` – tracing subscriber setup
//!  * `metrics` – process-wide delivery counters
//!
//! Storage, wire encoding, clustering and the network transport are external
//! collaborators reached through the traits in [`core::kernel`].

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod broker;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use broker::{AckRouter, PersistenceConnector};
pub use config::{load_config, Config};
pub use crate::core::delivery::{build_strategy, DeliveryStrategy, DeliveryStrategyKind};
