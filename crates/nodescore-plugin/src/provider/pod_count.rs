use std::sync::Arc;

use nodescore_core::Context;
use tracing::debug;

use super::MetricProvider;
use crate::error::{ProviderError, ProviderResult};
use crate::framework::{BoxFuture, CycleState};
use crate::snapshot::SchedulerHandle;

/// Raw score = number of pods nominated onto the node.
pub struct PodCountProvider {
    handle: Arc<dyn SchedulerHandle>,
}

impl PodCountProvider {
    pub fn new(handle: Arc<dyn SchedulerHandle>) -> Self {
        Self { handle }
    }

    fn count(&self, node_name: &str) -> ProviderResult<i64> {
        self.handle
            .node_info(node_name)
            .map_err(|_| ProviderError::NodeNotFound(node_name.to_string()))?;

        let pods = self.handle.nominated_pods_for_node(node_name);
        debug!(node = %node_name, nominated = pods.len(), "counted nominated pods");
        Ok(i64::try_from(pods.len()).unwrap_or(i64::MAX))
    }
}

impl MetricProvider for PodCountProvider {
    fn name(&self) -> &'static str {
        "pod_count"
    }

    fn measure<'a>(
        &'a self,
        _ctx: &'a Context,
        _state: &'a CycleState,
        node_name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<i64>> {
        Box::pin(async move { self.count(node_name) })
    }
}
