//! Node name → metrics instance address.
//!
//! Exporters are scraped under `host:port`, so that is what a node name
//! resolves to. The index is rebuilt from the snapshot's node addresses,
//! with statically configured entries taking precedence. Readers get an
//! immutable [`AddressTable`]; updates swap in a new table so a table
//! handed out for a cycle never changes underneath it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use nodescore_core::{NodeInfo, NodeName};
use nodescore_metrics::instance_address;
use tracing::debug;

/// Immutable node name → `host:port` table.
pub type AddressTable = HashMap<NodeName, String>;

/// Copy-on-write index of instance addresses.
#[derive(Debug)]
pub struct NodeAddressIndex {
    exporter_port: u16,
    /// Configured `name → host` entries; win over discovered addresses.
    overrides: HashMap<NodeName, String>,
    table: RwLock<Arc<AddressTable>>,
}

impl NodeAddressIndex {
    pub fn new(exporter_port: u16) -> Self {
        Self {
            exporter_port,
            overrides: HashMap::new(),
            table: RwLock::new(Arc::new(AddressTable::new())),
        }
    }

    /// Seed the index with static `name → host` entries.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<NodeName>,
        V: Into<String>,
    {
        self.overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let table: AddressTable = self
            .overrides
            .iter()
            .map(|(name, host)| (name.clone(), instance_address(host, self.exporter_port)))
            .collect();
        self.table = RwLock::new(Arc::new(table));
        self
    }

    pub fn exporter_port(&self) -> u16 {
        self.exporter_port
    }

    /// Set the host for one node. Ignored if the node has a static entry.
    #[cfg(test)]
    fn upsert(&self, name: &str, host: &str) {
        if self.overrides.contains_key(name) {
            return;
        }
        let address = instance_address(host, self.exporter_port);
        self.update(|table| {
            table.insert(name.to_string(), address);
        });
    }

    /// Drop a discovered node. Static entries stay.
    #[cfg(test)]
    fn remove(&self, name: &str) {
        if self.overrides.contains_key(name) {
            return;
        }
        self.update(|table| {
            table.remove(name);
        });
    }

    /// Replace discovered entries with the addresses of `nodes`.
    ///
    /// Nodes without a usable address are left out; static entries are
    /// always kept.
    pub fn sync_from_nodes(&self, nodes: &[NodeInfo]) {
        let mut table: AddressTable = self
            .overrides
            .iter()
            .map(|(name, host)| (name.clone(), instance_address(host, self.exporter_port)))
            .collect();

        for node in nodes {
            if table.contains_key(&node.name) {
                continue;
            }
            match node.preferred_address() {
                Some(host) => {
                    table.insert(node.name.clone(), instance_address(host, self.exporter_port));
                }
                None => debug!(node = %node.name, "node has no usable address"),
            }
        }

        debug!(entries = table.len(), "address index synced");
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Current table. Later updates do not affect the returned value.
    pub fn table(&self) -> Arc<AddressTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.table.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    #[cfg(test)]
    fn update(&self, f: impl FnOnce(&mut AddressTable)) {
        let mut current = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = AddressTable::clone(&current);
        f(&mut next);
        *current = Arc::new(next);
    }
}
