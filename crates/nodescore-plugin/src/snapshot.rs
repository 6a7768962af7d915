//! Cluster snapshot interface.
//!
//! The scheduler owns the real snapshot; plugins only read it through
//! [`SchedulerHandle`]. [`InMemorySnapshot`] backs tests and the dry-run
//! binary.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use nodescore_core::{NodeInfo, NodeName, PodRef};

use crate::error::{SnapshotError, SnapshotResult};

/// Read access to scheduler state handed to plugins at construction.
///
/// Implementations must be safe for concurrent reads; the scheduler
/// keeps the snapshot unchanged for the duration of a cycle.
pub trait SchedulerHandle: Send + Sync {
    fn node_info(&self, name: &str) -> SnapshotResult<NodeInfo>;

    /// Pods tentatively assigned to `name` but not yet bound.
    fn nominated_pods_for_node(&self, name: &str) -> Vec<PodRef>;

    fn list_nodes(&self) -> Vec<NodeInfo>;
}

/// Serialized snapshot: nodes plus nominated pods per node.
#[derive(Debug, Default, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    nodes: Vec<NodeInfo>,
    #[serde(default)]
    nominated_pods: HashMap<NodeName, Vec<PodRef>>,
}

/// Snapshot held in memory.
#[derive(Debug, Default)]
pub struct InMemorySnapshot {
    nodes: RwLock<BTreeMap<NodeName, NodeInfo>>,
    nominated: RwLock<HashMap<NodeName, Vec<PodRef>>>,
}

impl InMemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON of the form
    /// `{"nodes": [NodeInfo...], "nominated_pods": {"node": [PodRef...]}}`.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let file: SnapshotFile = serde_json::from_str(json)?;
        let snapshot = Self::new();
        for node in file.nodes {
            snapshot.upsert_node(node);
        }
        for (node, pods) in file.nominated_pods {
            for pod in pods {
                snapshot.nominate(&node, pod);
            }
        }
        Ok(snapshot)
    }

    pub fn from_file(path: &Path) -> SnapshotResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn upsert_node(&self, node: NodeInfo) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.insert(node.name.clone(), node);
    }

    /// Remove a node and its nominations.
    pub fn remove_node(&self, name: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut nominated = self.nominated.write().unwrap_or_else(PoisonError::into_inner);
        nominated.remove(name);
        nodes.remove(name).is_some()
    }

    pub fn nominate(&self, node: &str, pod: PodRef) {
        let mut nominated = self.nominated.write().unwrap_or_else(PoisonError::into_inner);
        let pods = nominated.entry(node.to_string()).or_default();
        if !pods.contains(&pod) {
            pods.push(pod);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchedulerHandle for InMemorySnapshot {
    fn node_info(&self, name: &str) -> SnapshotResult<NodeInfo> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .get(name)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(name.to_string()))
    }

    fn nominated_pods_for_node(&self, name: &str) -> Vec<PodRef> {
        let nominated = self.nominated.read().unwrap_or_else(PoisonError::into_inner);
        nominated.get(name).cloned().unwrap_or_default()
    }

    fn list_nodes(&self) -> Vec<NodeInfo> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescore_core::AddressKind;

    #[test]
    fn node_info_not_found() {
        let snapshot = InMemorySnapshot::new();
        let err = snapshot.node_info("ghost").unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(name) if name == "ghost"));
    }

    #[test]
    fn nominations_are_deduplicated() {
        let snapshot = InMemorySnapshot::new();
        snapshot.upsert_node(NodeInfo::new("n1"));
        snapshot.nominate("n1", PodRef::new("default", "a"));
        snapshot.nominate("n1", PodRef::new("default", "a"));
        snapshot.nominate("n1", PodRef::new("default", "b"));

        assert_eq!(snapshot.nominated_pods_for_node("n1").len(), 2);
        assert!(snapshot.nominated_pods_for_node("n2").is_empty());
    }

    #[test]
    fn remove_node_drops_nominations() {
        let snapshot = InMemorySnapshot::new();
        snapshot.upsert_node(NodeInfo::new("n1"));
        snapshot.nominate("n1", PodRef::new("default", "a"));

        assert!(snapshot.remove_node("n1"));
        assert!(!snapshot.remove_node("n1"));
        assert!(snapshot.is_empty());
        assert!(snapshot.nominated_pods_for_node("n1").is_empty());
    }

    #[test]
    fn list_nodes_is_sorted_by_name() {
        let snapshot = InMemorySnapshot::new();
        snapshot.upsert_node(NodeInfo::new("b"));
        snapshot.upsert_node(NodeInfo::new("a"));

        let names: Vec<String> = snapshot.list_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn loads_from_json() {
        let snapshot = InMemorySnapshot::from_json(
            r#"{
                "nodes": [
                    {"name": "k8s-node1", "addresses": [{"kind": "InternalIP", "address": "10.10.10.171"}]},
                    {"name": "k8s-node2"}
                ],
                "nominated_pods": {
                    "k8s-node1": [{"namespace": "default", "name": "web-0"}]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 2);
        let node = snapshot.node_info("k8s-node1").unwrap();
        assert_eq!(node.addresses[0].kind, AddressKind::InternalIP);
        assert_eq!(node.preferred_address(), Some("10.10.10.171"));
        assert_eq!(snapshot.nominated_pods_for_node("k8s-node1").len(), 1);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = InMemorySnapshot::from_json("{\"nodes\": 3}").unwrap_err();
        assert!(matches!(err, SnapshotError::Decode(_)));
    }
}
