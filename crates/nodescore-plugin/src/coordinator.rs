//! The scoring plugin.
//!
//! `score` runs concurrently per node and only produces raw provider
//! values; `normalize_score` runs once per cycle and rescales them. No
//! state is kept between cycles. Anything a cycle needs to share lives
//! in its [`CycleState`].

use std::sync::Arc;
use std::time::Duration;

use nodescore_core::{
    ConfigError, Context, Interrupted, NodeScoreList, NodescoreConfig, PodRef, ProviderKind,
    ScoreRange,
};
use nodescore_metrics::PrometheusClient;
use tracing::{debug, info, warn};

use crate::address::NodeAddressIndex;
use crate::error::PluginResult;
use crate::framework::{BoxFuture, CycleState, NodeScorer, Plugin, ScoreFinisher, Status};
use crate::normalize::normalize;
use crate::provider::{BandwidthProvider, MetricProvider, PodCountProvider};
use crate::snapshot::SchedulerHandle;

const DEFAULT_SCORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Node-scoring plugin backed by one [`MetricProvider`].
pub struct ScoringCoordinator {
    name: String,
    handle: Arc<dyn SchedulerHandle>,
    provider: Arc<dyn MetricProvider>,
    score_timeout: Duration,
    range: ScoreRange,
}

impl ScoringCoordinator {
    /// Build the plugin selected by `config`.
    ///
    /// For the network traffic provider this connects to the metrics
    /// backend once; a backend that is not reachable fails construction.
    pub async fn new(
        config: &NodescoreConfig,
        handle: Arc<dyn SchedulerHandle>,
    ) -> PluginResult<Self> {
        config.validate()?;

        let kind = config.plugin.provider;
        let provider: Arc<dyn MetricProvider> = match kind {
            ProviderKind::PodCount => Arc::new(PodCountProvider::new(Arc::clone(&handle))),
            ProviderKind::NetworkTraffic => {
                let traffic = config
                    .network_traffic
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("network_traffic"))?;

                let client =
                    PrometheusClient::connect(&traffic.prometheus_address, traffic.query_timeout)
                        .await?;
                debug!(
                    backend = client.address(),
                    query_timeout = ?client.query_timeout(),
                    "metrics backend connected"
                );
                let addresses = NodeAddressIndex::new(traffic.exporter_port).with_overrides(
                    config
                        .nodes
                        .iter()
                        .map(|n| (n.name.clone(), n.address.clone())),
                );

                Arc::new(
                    BandwidthProvider::new(
                        Arc::new(client),
                        Arc::clone(&handle),
                        Arc::new(addresses),
                        traffic.network_interface.clone(),
                        traffic.time_range,
                    )
                    .with_preference(traffic.preference),
                )
            }
        };

        let plugin = Self::with_provider(kind.plugin_name(), handle, provider)
            .with_score_timeout(config.plugin.score_timeout);
        info!(
            plugin = %plugin.name,
            provider = plugin.provider.name(),
            score_timeout = ?plugin.score_timeout(),
            "scoring plugin initialized"
        );
        Ok(plugin)
    }

    /// Build around an existing provider.
    pub fn with_provider(
        name: impl Into<String>,
        handle: Arc<dyn SchedulerHandle>,
        provider: Arc<dyn MetricProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            provider,
            score_timeout: DEFAULT_SCORE_TIMEOUT,
            range: ScoreRange::FRAMEWORK,
        }
    }

    pub fn with_score_timeout(mut self, timeout: Duration) -> Self {
        self.score_timeout = timeout;
        self
    }

    /// Target range of the finishing pass.
    pub fn with_range(mut self, range: ScoreRange) -> Self {
        self.range = range;
        self
    }

    pub fn score_timeout(&self) -> Duration {
        self.score_timeout
    }

    pub fn range(&self) -> ScoreRange {
        self.range
    }

    async fn score_node(&self, ctx: &Context, state: &CycleState, node_name: &str) -> (i64, Status) {
        if let Err(reason) = ctx.check() {
            warn!(plugin = %self.name, node = %node_name, kind = interrupted_kind(reason), "score skipped");
            return (0, Status::error(format!("scoring node {node_name:?}: {reason}")));
        }

        if let Err(e) = self.handle.node_info(node_name) {
            warn!(plugin = %self.name, node = %node_name, error = %e, "node missing from snapshot");
            return (0, Status::error(format!("getting node {node_name:?} from snapshot: {e}")));
        }

        let ctx = ctx.with_timeout(self.score_timeout);
        match ctx.run(self.provider.measure(&ctx, state, node_name)).await {
            Ok(Ok(raw)) => {
                debug!(
                    plugin = %self.name,
                    node = %node_name,
                    raw,
                    remaining = ?ctx.remaining(),
                    "scored node"
                );
                (raw, Status::success())
            }
            Ok(Err(e)) => {
                warn!(plugin = %self.name, node = %node_name, kind = e.kind(), error = %e, "score failed");
                (0, Status::error(e.to_string()))
            }
            Err(reason) => {
                warn!(plugin = %self.name, node = %node_name, kind = interrupted_kind(reason), "score interrupted");
                (0, Status::error(format!("scoring node {node_name:?}: {reason}")))
            }
        }
    }
}

fn interrupted_kind(reason: Interrupted) -> &'static str {
    match reason {
        Interrupted::DeadlineExceeded => "timeout",
        Interrupted::Cancelled => "cancelled",
    }
}

impl Plugin for ScoringCoordinator {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NodeScorer for ScoringCoordinator {
    fn score<'a>(
        &'a self,
        ctx: &'a Context,
        state: &'a CycleState,
        _pod: &'a PodRef,
        node_name: &'a str,
    ) -> BoxFuture<'a, (i64, Status)> {
        Box::pin(self.score_node(ctx, state, node_name))
    }

    fn score_extensions(&self) -> Option<&dyn ScoreFinisher> {
        Some(self)
    }
}

impl ScoreFinisher for ScoringCoordinator {
    fn normalize_score(
        &self,
        _ctx: &Context,
        _state: &CycleState,
        pod: &PodRef,
        scores: &mut NodeScoreList,
    ) -> Status {
        normalize(scores, self.range);

        let rendered: Vec<String> = scores.iter().map(ToString::to_string).collect();
        info!(plugin = %self.name, %pod, scores = %rendered.join(" "), "nodes final score");
        Status::success()
    }
}

impl std::fmt::Debug for ScoringCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringCoordinator")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("score_timeout", &self.score_timeout)
            .field("range", &self.range)
            .finish()
    }
}
