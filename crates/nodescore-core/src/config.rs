//! nodescore.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::duration;
use crate::error::{ConfigError, ConfigResult};

const DEFAULT_SCORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIME_RANGE: Duration = Duration::from_secs(30);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EXPORTER_PORT: u16 = 9100;

#[derive(Debug, Clone, Deserialize)]
pub struct NodescoreConfig {
    #[serde(default)]
    pub plugin: PluginConfig,
    pub network_traffic: Option<NetworkTrafficConfig>,
    /// Static address overrides, applied on top of node metadata.
    #[serde(default)]
    pub nodes: Vec<StaticNodeAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Upper bound on a single `score` call.
    #[serde(
        default = "default_score_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub score_timeout: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            score_timeout: DEFAULT_SCORE_TIMEOUT,
        }
    }
}

/// Which metric source feeds the scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Count of pods nominated to the node.
    #[default]
    PodCount,
    /// Network bytes moved by the node over a time window.
    NetworkTraffic,
}

impl ProviderKind {
    /// Name the scoring plugin registers under.
    pub fn plugin_name(&self) -> &'static str {
        match self {
            ProviderKind::PodCount => "LxyScore",
            ProviderKind::NetworkTraffic => "NetworkTraffic",
        }
    }
}

/// How measured bandwidth maps onto the raw score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthPreference {
    /// Lightly loaded nodes rank higher: raw score is `-bytes`.
    #[default]
    LeastUsed,
    /// Busy nodes rank higher: raw score is `+bytes`.
    MostUsed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkTrafficConfig {
    /// Base URL of the Prometheus server, e.g. `http://prometheus:9090`.
    pub prometheus_address: String,
    #[serde(default = "default_network_interface")]
    pub network_interface: String,
    #[serde(
        default = "default_time_range",
        deserialize_with = "duration::deserialize"
    )]
    pub time_range: Duration,
    #[serde(
        default = "default_query_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub query_timeout: Duration,
    /// Port node_exporter listens on; forms the `instance` label.
    #[serde(default = "default_exporter_port")]
    pub exporter_port: u16,
    #[serde(default)]
    pub preference: BandwidthPreference,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticNodeAddress {
    pub name: String,
    pub address: String,
}

fn default_score_timeout() -> Duration {
    DEFAULT_SCORE_TIMEOUT
}

fn default_network_interface() -> String {
    "eth0".to_string()
}

fn default_time_range() -> Duration {
    DEFAULT_TIME_RANGE
}

fn default_query_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}

fn default_exporter_port() -> u16 {
    DEFAULT_EXPORTER_PORT
}

impl NodescoreConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: NodescoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.plugin.score_timeout.is_zero() {
            return Err(invalid("plugin.score_timeout", "must be greater than zero"));
        }

        match (&self.plugin.provider, &self.network_traffic) {
            (ProviderKind::NetworkTraffic, None) => {
                return Err(ConfigError::MissingSection("network_traffic"));
            }
            (_, Some(nt)) => nt.validate()?,
            (_, None) => {}
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(invalid("nodes.name", "must not be empty"));
            }
            if node.address.trim().is_empty() {
                return Err(invalid("nodes.address", format!("empty for node {}", node.name)));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(invalid("nodes.name", format!("duplicate node {}", node.name)));
            }
        }

        Ok(())
    }
}

impl NetworkTrafficConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.prometheus_address.trim().is_empty() {
            return Err(invalid("network_traffic.prometheus_address", "must not be empty"));
        }
        if self.network_interface.trim().is_empty() {
            return Err(invalid("network_traffic.network_interface", "must not be empty"));
        }
        if self.time_range.is_zero() {
            return Err(invalid("network_traffic.time_range", "must be greater than zero"));
        }
        if self.query_timeout.is_zero() {
            return Err(invalid("network_traffic.query_timeout", "must be greater than zero"));
        }
        if self.exporter_port == 0 {
            return Err(invalid("network_traffic.exporter_port", "must not be zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
