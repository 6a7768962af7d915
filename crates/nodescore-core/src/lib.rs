//! nodescore-core: types shared by every nodescore crate.
//!
//! - **`types`**: node identity, scores, the framework score range
//! - **`context`**: per-call deadline and cancellation
//! - **`duration`**: `30s` / `500ms` style duration literals
//! - **`config`**: `nodescore.toml` parsing and validation

pub mod config;
pub mod context;
pub mod duration;
pub mod error;
pub mod types;

pub use config::{BandwidthPreference, NodescoreConfig, ProviderKind};
pub use context::{CancelHandle, Context, Interrupted};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
