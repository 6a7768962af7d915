//! nodescore-plugin: a node-scoring extension for a workload scheduler.
//!
//! The scheduler calls [`NodeScorer::score`] for every candidate node,
//! possibly in parallel, then calls [`ScoreFinisher::normalize_score`]
//! once to rescale the raw values into the framework score range.
//!
//! # Components
//!
//! - **`framework`**: plugin traits, `Status`, per-cycle `CycleState`
//! - **`snapshot`**: cluster snapshot interface and an in-memory one
//! - **`address`**: node name → metrics instance address index
//! - **`provider`**: metric sources (nominated pod count, bandwidth)
//! - **`normalize`**: min-max rescaling of raw scores
//! - **`coordinator`**: the scoring plugin itself
//! - **`runner`**: drives one scoring cycle the way the scheduler does
//!
//! # Architecture
//!
//! ```text
//! ScoringCoordinator
//!   ├── score(node) ─→ MetricProvider::measure(node)
//!   │                    ├── PodCountProvider ─→ SchedulerHandle
//!   │                    └── BandwidthProvider
//!   │                          ├── NodeAddressIndex (pinned per cycle)
//!   │                          ├── build_bandwidth_query()
//!   │                          └── PrometheusClient::query()
//!   └── normalize_score(list) ─→ normalize()
//! ```

pub mod address;
pub mod coordinator;
pub mod error;
pub mod framework;
pub mod normalize;
pub mod provider;
pub mod runner;
pub mod snapshot;

pub use address::{AddressTable, NodeAddressIndex};
pub use coordinator::ScoringCoordinator;
pub use error::{PluginError, PluginResult, ProviderError, ProviderResult, SnapshotError, SnapshotResult};
pub use framework::{BoxFuture, Code, CycleState, NodeScorer, Plugin, ScoreFinisher, Status};
pub use normalize::normalize;
pub use provider::{BandwidthProvider, MetricProvider, PodCountProvider};
pub use runner::{CycleResult, NodeFailure, run_cycle};
pub use snapshot::{InMemorySnapshot, SchedulerHandle};
