//! # Upstream Module
//!
//! Access to the CRM REST API: the raw HTTP client and the dispatcher that applies
//! admission, retry and per-attempt timeouts to every live call.

pub mod client;
pub mod dispatcher;

pub use client::{HttpUpstreamClient, UpstreamClient, UpstreamConfig};
pub use dispatcher::{PagedRecords, UpstreamDispatcher};
