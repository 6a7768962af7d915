//! Shared types used across nodescore crates.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a node in the cluster.
pub type NodeName = String;

/// Lowest score a scoring extension may hand back to the scheduler.
pub const MIN_NODE_SCORE: i64 = 0;

/// Highest score a scoring extension may hand back to the scheduler.
pub const MAX_NODE_SCORE: i64 = 100;

// ── Scores ─────────────────────────────────────────────────────────

/// Score of a single candidate node.
///
/// Holds the raw provider value while collecting and the normalized
/// value after the finishing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScore {
    pub name: NodeName,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<NodeName>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

impl fmt::Display for NodeScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.score)
    }
}

/// Ordered scores for every candidate of one scheduling cycle.
pub type NodeScoreList = Vec<NodeScore>;

/// Inclusive integer interval that normalized scores land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    min: i64,
    max: i64,
}

impl ScoreRange {
    /// The scheduler framework's `[MIN_NODE_SCORE, MAX_NODE_SCORE]`.
    pub const FRAMEWORK: ScoreRange = ScoreRange {
        min: MIN_NODE_SCORE,
        max: MAX_NODE_SCORE,
    };

    /// Returns `None` when `min > max`.
    pub fn new(min: i64, max: i64) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, score: i64) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::FRAMEWORK
    }
}

// ── Cluster objects ────────────────────────────────────────────────

/// Reference to a pod (the workload being placed, or a nominated one).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`; a bare name lands in `default`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('/') {
            Some((ns, name)) => Self::new(ns, name),
            None => Self::new("default", s),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of address a node reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    InternalIP,
    ExternalIP,
    Hostname,
}

impl AddressKind {
    /// Lower is preferred when picking a node's metrics address.
    pub fn preference(&self) -> u8 {
        match self {
            AddressKind::InternalIP => 0,
            AddressKind::ExternalIP => 1,
            AddressKind::Hostname => 2,
        }
    }
}

/// One address reported in a node's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub kind: AddressKind,
    pub address: String,
}

/// Snapshot view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: NodeName,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<NodeName>) -> Self {
        Self {
            name: name.into(),
            addresses: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn with_address(mut self, kind: AddressKind, address: impl Into<String>) -> Self {
        self.addresses.push(NodeAddress {
            kind,
            address: address.into(),
        });
        self
    }

    /// The address metrics should be scraped from: InternalIP first,
    /// then ExternalIP, then Hostname.
    pub fn preferred_address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .filter(|a| !a.address.is_empty())
            .min_by_key(|a| a.kind.preference())
            .map(|a| a.address.as_str())
    }
}
