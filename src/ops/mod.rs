//! Cluster operations and the pipeline that runs them
//!
//! An operation fans one request out to a set of hosts, classifies what came
//! back and records derived facts in the execution context for the
//! operations after it.

pub mod base;
pub mod context;
pub mod engine;
pub mod errors;
pub mod masking;

pub mod https_find_subcluster;
pub mod nma_bootstrap_catalog;
pub mod nma_delete_dir;
pub mod nma_get_scrutinize_tar;
pub mod nma_network_profile;

pub use base::{has_quorum, quorum_count, ClusterOp, OpBase, OpHttpsBase, OpResponseMap};
pub use context::{NetworkProfile, OpEngineExecContext, RestorePoint};
pub use engine::OpEngine;
pub use errors::{HostErrors, HostFailure, OpError};
pub use masking::{mask_request_body, SensitiveFields};

pub use https_find_subcluster::HttpsFindSubclusterOp;
pub use nma_bootstrap_catalog::NmaBootstrapCatalogOp;
pub use nma_delete_dir::NmaDeleteDirectoriesOp;
pub use nma_get_scrutinize_tar::NmaGetScrutinizeTarOp;
pub use nma_network_profile::NmaNetworkProfileOp;
