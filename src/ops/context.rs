//! Execution context threaded through one pipeline run
//!
//! Operations add or overwrite named slots here for later operations to
//! consume. A slot that no earlier operation filled is "not yet known":
//! empty collections and `None` are valid states, not errors.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slog::Logger;

use crate::config::EngineConfig;
use crate::http::{AdapterFactory, HttpRequestDispatcher};

/// Network interface facts reported by a node's management agent
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub name: String,
    pub address: String,
    pub subnet: String,
    pub netmask: String,
    pub broadcast: String,
}

/// A restore point found in a backup archive
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestorePoint {
    pub archive: String,
    pub id: String,
    pub index: u32,
    pub timestamp: String,
    pub vertica_version: String,
}

/// State shared by the operations of one command invocation.
///
/// Owned by the caller and passed by `&mut` to one operation at a time, so
/// no locking is involved.
pub struct OpEngineExecContext {
    pub config: Arc<EngineConfig>,

    pub dispatcher: HttpRequestDispatcher,

    /// host → network profile
    pub network_profiles: HashMap<String, NetworkProfile>,

    /// Sorted list of hosts whose node is up
    pub up_hosts: Vec<String>,

    /// up host → subcluster name
    pub up_sc_info: HashMap<String, String>,

    /// up host → sandbox name
    pub up_hosts_to_sandboxes: HashMap<String, String>,

    pub default_sc_name: Option<String>,

    pub hosts_with_latest_catalog: Vec<String>,

    pub primary_hosts_with_latest_catalog: Vec<String>,

    /// host → command line used to start its node
    pub startup_command_map: HashMap<String, Vec<String>>,

    /// Database info retrieved from communal storage
    pub db_info: Option<String>,

    pub restore_points: Vec<RestorePoint>,
}

impl OpEngineExecContext {
    pub fn new(
        config: Arc<EngineConfig>,
        factory: Arc<dyn AdapterFactory>,
        logger: &Logger,
    ) -> Self {
        Self {
            config,
            dispatcher: HttpRequestDispatcher::new(factory, logger),
            network_profiles: HashMap::new(),
            up_hosts: Vec::new(),
            up_sc_info: HashMap::new(),
            up_hosts_to_sandboxes: HashMap::new(),
            default_sc_name: None,
            hosts_with_latest_catalog: Vec::new(),
            primary_hosts_with_latest_catalog: Vec::new(),
            startup_command_map: HashMap::new(),
            db_info: None,
            restore_points: Vec::new(),
        }
    }

    /// Replace the up-host list, keeping it sorted
    pub fn set_up_hosts(&mut self, mut hosts: Vec<String>) {
        hosts.sort();
        hosts.dedup();
        self.up_hosts = hosts;
    }

    pub fn network_profile(&self, host: &str) -> Option<&NetworkProfile> {
        self.network_profiles.get(host)
    }
}

impl std::fmt::Debug for OpEngineExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpEngineExecContext")
            .field("dispatcher", &"<HttpRequestDispatcher>")
            .field("network_profiles", &self.network_profiles)
            .field("up_hosts", &self.up_hosts)
            .field("default_sc_name", &self.default_sc_name)
            .field("hosts_with_latest_catalog", &self.hosts_with_latest_catalog)
            .field("restore_points", &self.restore_points.len())
            .finish()
    }
}
