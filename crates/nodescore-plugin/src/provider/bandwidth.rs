use std::sync::Arc;
use std::time::Duration;

use nodescore_core::{BandwidthPreference, Context};
use nodescore_metrics::{PrometheusClient, build_bandwidth_query};
use tracing::debug;

use super::MetricProvider;
use crate::address::{AddressTable, NodeAddressIndex};
use crate::error::{ProviderError, ProviderResult};
use crate::framework::{BoxFuture, CycleState};
use crate::snapshot::SchedulerHandle;

/// Cycle-state key of the address table pinned for the cycle.
pub(crate) const ADDRESS_TABLE_KEY: &str = "nodescore/address-table";

/// Raw score from bytes received plus transmitted on one interface over
/// a trailing window, as reported by node_exporter.
pub struct BandwidthProvider {
    client: Arc<PrometheusClient>,
    handle: Arc<dyn SchedulerHandle>,
    addresses: Arc<NodeAddressIndex>,
    interface: String,
    window: Duration,
    preference: BandwidthPreference,
}

impl BandwidthProvider {
    pub fn new(
        client: Arc<PrometheusClient>,
        handle: Arc<dyn SchedulerHandle>,
        addresses: Arc<NodeAddressIndex>,
        interface: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            client,
            handle,
            addresses,
            interface: interface.into(),
            window,
            preference: BandwidthPreference::default(),
        }
    }

    pub fn with_preference(mut self, preference: BandwidthPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Address table for this cycle. The first caller of a cycle syncs
    /// the index from the snapshot; everyone after reads the same table.
    fn pinned_table(&self, state: &CycleState) -> Arc<AddressTable> {
        state.get_or_insert_with(ADDRESS_TABLE_KEY, || {
            self.addresses.sync_from_nodes(&self.handle.list_nodes());
            self.addresses.table()
        })
    }

    async fn bytes(&self, ctx: &Context, state: &CycleState, node_name: &str) -> ProviderResult<i64> {
        let table = self.pinned_table(state);
        let address = table
            .get(node_name)
            .ok_or_else(|| ProviderError::AddressUnresolved(node_name.to_string()))?;

        let query = build_bandwidth_query(address, &self.interface, self.window);
        debug!(node = %node_name, %query, "querying bandwidth");

        let sample = self
            .client
            .query(ctx, &query)
            .await
            .map_err(|source| ProviderError::MetricUnavailable {
                node: node_name.to_string(),
                source,
            })?;

        let bytes = to_raw(sample.value).ok_or_else(|| ProviderError::InvalidSample {
            node: node_name.to_string(),
            value: sample.value,
        })?;

        debug!(node = %node_name, bytes, "bandwidth sample");
        Ok(match self.preference {
            BandwidthPreference::LeastUsed => bytes.saturating_neg(),
            BandwidthPreference::MostUsed => bytes,
        })
    }
}

/// Truncate toward zero, saturating at the `i64` bounds.
fn to_raw(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.trunc() as i64)
}

impl MetricProvider for BandwidthProvider {
    fn name(&self) -> &'static str {
        "bandwidth"
    }

    fn measure<'a>(
        &'a self,
        ctx: &'a Context,
        state: &'a CycleState,
        node_name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<i64>> {
        Box::pin(self.bytes(ctx, state, node_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::InMemorySnapshot;
    use nodescore_core::{AddressKind, NodeInfo};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend(value: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/-/ready"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "resultType": "vector",
                    "result": [{ "metric": {}, "value": [1700000000.0, value] }]
                }
            })))
            .mount(&server)
            .await;
        server
    }

    async fn provider(server: &MockServer, snapshot: InMemorySnapshot) -> BandwidthProvider {
        let client = PrometheusClient::connect(&server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        BandwidthProvider::new(
            Arc::new(client),
            Arc::new(snapshot),
            Arc::new(NodeAddressIndex::new(9100)),
            "eth0",
            Duration::from_secs(30),
        )
    }

    fn one_node() -> InMemorySnapshot {
        let snapshot = InMemorySnapshot::new();
        snapshot.upsert_node(NodeInfo::new("n1").with_address(AddressKind::InternalIP, "10.0.0.5"));
        snapshot
    }

    #[test]
    fn conversion_truncates_and_saturates() {
        assert_eq!(to_raw(1234.9), Some(1234));
        assert_eq!(to_raw(-0.5), Some(0));
        assert_eq!(to_raw(1e30), Some(i64::MAX));
        assert_eq!(to_raw(f64::NAN), None);
        assert_eq!(to_raw(f64::INFINITY), None);
    }

    #[tokio::test]
    async fn least_used_negates_bytes() {
        let server = backend("4096.7").await;
        let provider = provider(&server, one_node()).await;

        let raw = provider
            .measure(&Context::background(), &CycleState::new(), "n1")
            .await
            .unwrap();
        assert_eq!(raw, -4096);

        let requests = server.received_requests().await.unwrap();
        let body = requests
            .iter()
            .find(|r| r.url.path() == "/api/v1/query")
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .unwrap();
        assert!(body.contains("10.0.0.5%3A9100"), "body: {body}");
    }

    #[tokio::test]
    async fn most_used_keeps_sign() {
        let server = backend("4096").await;
        let provider = provider(&server, one_node())
            .await
            .with_preference(BandwidthPreference::MostUsed);

        let raw = provider
            .measure(&Context::background(), &CycleState::new(), "n1")
            .await
            .unwrap();
        assert_eq!(raw, 4096);
    }

    #[tokio::test]
    async fn node_without_address_is_unresolved() {
        let server = backend("1").await;
        let snapshot = one_node();
        snapshot.upsert_node(NodeInfo::new("bare"));
        let provider = provider(&server, snapshot).await;

        let err = provider
            .measure(&Context::background(), &CycleState::new(), "bare")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "address_unresolved");
    }

    #[tokio::test]
    async fn non_finite_sample_is_invalid() {
        let server = backend("NaN").await;
        let provider = provider(&server, one_node()).await;

        let err = provider
            .measure(&Context::background(), &CycleState::new(), "n1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSample { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn address_table_is_pinned_for_the_cycle() {
        let server = backend("1").await;
        let snapshot = Arc::new(one_node());
        let client = PrometheusClient::connect(&server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        let provider = BandwidthProvider::new(
            Arc::new(client),
            snapshot.clone(),
            Arc::new(NodeAddressIndex::new(9100)),
            "eth0",
            Duration::from_secs(30),
        );

        let state = CycleState::new();
        let ctx = Context::background();
        provider.measure(&ctx, &state, "n1").await.unwrap();

        // Joins mid-cycle; not visible until the next cycle.
        snapshot.upsert_node(NodeInfo::new("n2").with_address(AddressKind::InternalIP, "10.0.0.6"));
        let err = provider.measure(&ctx, &state, "n2").await.unwrap_err();
        assert_eq!(err.kind(), "address_unresolved");

        let next_cycle = CycleState::new();
        assert!(provider.measure(&ctx, &next_cycle, "n2").await.is_ok());
    }
}
