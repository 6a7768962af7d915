//! Metric providers.
//!
//! A provider turns a node name into one raw integer. Higher raw values
//! end up as higher scores after normalization, so each provider decides
//! the sign of what it measures.

mod bandwidth;
mod pod_count;

pub use bandwidth::BandwidthProvider;
pub use pod_count::PodCountProvider;

use nodescore_core::Context;

use crate::error::ProviderResult;
use crate::framework::{BoxFuture, CycleState};

/// Source of a raw per-node value.
pub trait MetricProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn measure<'a>(
        &'a self,
        ctx: &'a Context,
        state: &'a CycleState,
        node_name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<i64>>;
}
