//! Plugin error types.

use nodescore_core::ConfigError;
use nodescore_metrics::MetricsError;
use thiserror::Error;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors from the cluster snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Per-node measurement failures. None of these abort the cycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("node {0} not found in snapshot")]
    NodeNotFound(String),

    #[error("no metrics address known for node {0}")]
    AddressUnresolved(String),

    #[error("metric unavailable for node {node}: {source}")]
    MetricUnavailable {
        node: String,
        #[source]
        source: MetricsError,
    },

    #[error("sample value {value} for node {node} is not a finite number")]
    InvalidSample { node: String, value: f64 },
}

impl ProviderError {
    /// Stable label for logs. Client failures keep the client's label
    /// so timeouts stay distinguishable from query errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NodeNotFound(_) => "node_not_found",
            ProviderError::AddressUnresolved(_) => "address_unresolved",
            ProviderError::MetricUnavailable { source, .. } => source.kind(),
            ProviderError::InvalidSample { .. } => "invalid_sample",
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Errors raised while building the plugin or finishing a cycle.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend construction failed. Fatal for the plugin.
    #[error("metrics backend error: {0}")]
    Backend(#[from] MetricsError),

    #[error("normalized score {score} for node {node} outside [{min}, {max}]")]
    ScoreOutOfRange {
        node: String,
        score: i64,
        min: i64,
        max: i64,
    },

    #[error("normalize score failed: {0}")]
    Finish(String),

    #[error("scoring worker failed: {0}")]
    Worker(String),
}
