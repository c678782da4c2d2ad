//! # Gateway Module
//!
//! The [`Gateway`] wires admission, retry, single-flight, the cache and the warmer
//! together and exposes `perform_request`.

pub mod core;

pub use self::core::{Gateway, GatewayStats};
