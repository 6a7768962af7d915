//! nodescore-metrics: talking to the time-series backend.
//!
//! # Architecture
//!
//! ```text
//! build_bandwidth_query(instance, device, window) → PromQL string
//!
//! PrometheusClient
//!   ├── connect() → readiness probe, fails with BackendUnavailable
//!   └── query(ctx, promql) → POST /api/v1/query → Sample
//! ```
//!
//! Every query is bounded by the caller's [`nodescore_core::Context`]
//! and by the client's own query timeout, whichever ends first.

pub mod client;
pub mod error;
pub mod query;

pub use client::{PrometheusClient, Sample};
pub use error::{MetricsError, MetricsResult};
pub use query::{build_bandwidth_query, instance_address};
