//! Metrics client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while querying the time-series backend.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The backend could not be reached when the client was built.
    /// Fatal: no client exists afterward.
    #[error("metrics backend {address} unavailable: {reason}")]
    BackendUnavailable { address: String, reason: String },

    #[error("query failed ({error_type}): {message}")]
    Query { error_type: String, message: String },

    #[error("expected exactly one series, got {series} ({result_type} result)")]
    Shape {
        result_type: &'static str,
        series: usize,
    },

    #[error("query timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("query cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl MetricsError {
    /// Stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricsError::BackendUnavailable { .. } => "backend_unavailable",
            MetricsError::Query { .. } => "query_error",
            MetricsError::Shape { .. } => "shape_error",
            MetricsError::Timeout { .. } => "timeout",
            MetricsError::Cancelled => "cancelled",
            MetricsError::Transport(_) => "transport",
            MetricsError::Decode(_) => "decode",
        }
    }
}
