//! # CRM Gateway Library
//!
//! Traffic-shaping core for a CRM REST API: outbound rate limiting, classified retry
//! with exponential backoff, single-flight collapsing of identical reads, a TTL response
//! cache with per-entity policy, and cache warm-up with periodic refresh.
//!
//! The entry point is [`Gateway::perform_request`]:
//!
//! ```no_run
//! use crm_gateway::{Gateway, GatewayConfig, RequestOptions};
//!
//! # async fn run() -> crm_gateway::GatewayResult<()> {
//! let config = GatewayConfig::load_from_file("config/gateway.yaml").await?;
//! let gateway = Gateway::new(config)?;
//!
//! let products = gateway
//!     .perform_request("/Product", RequestOptions::get().with_query("maxSize", "50"))
//!     .await?;
//! println!("{}", products["total"]);
//! # Ok(())
//! # }
//! ```

/// Error types, configuration, retry and request types
pub mod core;

/// The gateway composition root
pub mod gateway;

/// Response cache, single-flight registry, warm-up and cache admin API
pub mod caching;

/// Outbound admission control
pub mod traffic;

/// HTTP client and dispatcher for the CRM REST API
pub mod upstream;

/// Structured logging and metrics
pub mod observability;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::core::types::{EntityRequest, Method, Payload, RequestOptions};
pub use crate::gateway::Gateway;
