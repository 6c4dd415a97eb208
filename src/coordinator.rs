//! Cluster inventory handed to the engine by its caller
//!
//! Operations read per-node metadata from here when building request bodies.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One database node as known to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VCoordinationNode {
    pub name: String,
    pub address: String,
    /// Client port; the control (spread) port is derived from it
    pub port: u16,
    pub catalog_path: String,
    pub storage_locations: Vec<String>,
    pub depot_path: String,
    pub is_primary: bool,
}

impl VCoordinationNode {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            port: 5433,
            is_primary: true,
            ..Default::default()
        }
    }

    pub fn with_catalog_path(mut self, path: &str) -> Self {
        self.catalog_path = path.to_string();
        self
    }

    pub fn with_storage_location(mut self, path: &str) -> Self {
        self.storage_locations.push(path.to_string());
        self
    }

    pub fn with_depot_path(mut self, path: &str) -> Self {
        self.depot_path = path.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn secondary(mut self) -> Self {
        self.is_primary = false;
        self
    }
}

/// The database and its nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VCoordinationDatabase {
    pub name: String,
    pub host_list: Vec<String>,
    pub host_node_map: HashMap<String, VCoordinationNode>,

    pub catalog_prefix: String,
    pub data_prefix: String,
    pub use_depot: bool,
    pub depot_prefix: String,

    // Eon mode
    pub num_shards: u32,
    pub communal_storage_location: String,
    pub aws_id_key: String,
    pub aws_secret_key: String,
}

impl VCoordinationDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Register `node` on `host`, keeping `host_list` in insertion order
    pub fn add_node(&mut self, host: &str, node: VCoordinationNode) {
        if !self.host_node_map.contains_key(host) {
            self.host_list.push(host.to_string());
        }
        self.host_node_map.insert(host.to_string(), node);
    }

    pub fn node(&self, host: &str) -> Option<&VCoordinationNode> {
        self.host_node_map.get(host)
    }

    pub fn primary_node_count(&self) -> usize {
        self.host_node_map.values().filter(|n| n.is_primary).count()
    }

    /// host → node name, for every known host
    pub fn host_node_names(&self) -> HashMap<String, String> {
        self.host_node_map
            .iter()
            .map(|(host, node)| (host.clone(), node.name.clone()))
            .collect()
    }

    /// `<prefix>/<db name>`
    pub fn db_path(&self, prefix: &str) -> String {
        Path::new(prefix).join(&self.name).display().to_string()
    }
}

/// Options of database creation that shape the catalog bootstrap request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub password: String,
    pub configuration_parameters: HashMap<String, String>,
    pub large_cluster: i32,
    /// Point-to-point networking instead of broadcast
    pub p2p: bool,
    pub spread_logging: bool,
    pub spread_logging_level: i32,
    pub ipv6: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            password: String::new(),
            configuration_parameters: HashMap::new(),
            large_cluster: -1,
            p2p: true,
            spread_logging: false,
            spread_logging_level: -1,
            ipv6: false,
        }
    }
}

impl BootstrapOptions {
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.configuration_parameters
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn networking_mode(&self) -> &'static str {
        if self.p2p {
            "pt2pt"
        } else {
            "broadcast"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_keeps_host_order() {
        let mut vdb = VCoordinationDatabase::new("test_db");
        vdb.add_node("10.0.0.2", VCoordinationNode::new("v_test_db_node0002", "10.0.0.2"));
        vdb.add_node("10.0.0.1", VCoordinationNode::new("v_test_db_node0001", "10.0.0.1").secondary());
        vdb.add_node("10.0.0.2", VCoordinationNode::new("v_test_db_node0002", "10.0.0.2"));

        assert_eq!(vdb.host_list, vec!["10.0.0.2", "10.0.0.1"]);
        assert_eq!(vdb.primary_node_count(), 1);
        assert_eq!(vdb.host_node_names()["10.0.0.1"], "v_test_db_node0001");
    }

    #[test]
    fn test_db_path() {
        let vdb = VCoordinationDatabase::new("test_db");
        assert_eq!(vdb.db_path("/data"), "/data/test_db");
        assert_eq!(vdb.db_path("/data/"), "/data/test_db");
    }

    #[test]
    fn test_networking_mode() {
        let mut options = BootstrapOptions::default();
        assert_eq!(options.networking_mode(), "pt2pt");
        options.p2p = false;
        assert_eq!(options.networking_mode(), "broadcast");
    }
}
