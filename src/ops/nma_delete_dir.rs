use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::{info, Logger};

use super::base::{ClusterOp, OpBase};
use super::context::OpEngineExecContext;
use super::errors::{HostErrors, OpError};
use crate::coordinator::VCoordinationDatabase;
use crate::http::{HostHttpRequest, Method};

#[derive(Debug, Clone, Serialize)]
struct DeleteDirParams {
    directories: Vec<String>,
    force_delete: bool,
    sandbox: bool,
}

/// Removes a database's catalog, data and depot directories from every
/// node.
pub struct NmaDeleteDirectoriesOp {
    base: OpBase,
    host_request_body_map: HashMap<String, String>,
}

impl NmaDeleteDirectoriesOp {
    pub fn new(
        vdb: &VCoordinationDatabase,
        force_delete: bool,
        logger: &Logger,
    ) -> Result<Self, OpError> {
        let mut op = Self {
            base: OpBase::new("NMADeleteDirectoriesOp", vdb.host_list.clone(), logger),
            host_request_body_map: HashMap::new(),
        };
        op.build_request_body(vdb, force_delete)?;
        Ok(op)
    }

    fn build_request_body(
        &mut self,
        vdb: &VCoordinationDatabase,
        force_delete: bool,
    ) -> Result<(), OpError> {
        for (host, vnode) in &vdb.host_node_map {
            let mut directories = vec![vnode.catalog_path.clone()];
            directories.extend(vnode.storage_locations.iter().cloned());

            if vdb.use_depot {
                directories.push(vnode.depot_path.clone());
                directories.push(vdb.db_path(&vdb.depot_prefix));
            }

            directories.push(vdb.db_path(&vdb.catalog_prefix));
            directories.push(vdb.db_path(&vdb.data_prefix));

            let params = DeleteDirParams {
                directories,
                force_delete,
                sandbox: false,
            };
            let data = serde_json::to_string(&params).map_err(|e| {
                self.base
                    .config_error(format!("fail to marshal request data to JSON string: {}", e))
            })?;

            info!(self.base.logger, "Delete directory params"; "host" => host, "params" => ?params);
            self.host_request_body_map.insert(host.clone(), data);
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterOp for NmaDeleteDirectoriesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        ctx.dispatcher
            .setup(&self.base.hosts)
            .map_err(|source| OpError::Dispatch {
                op: self.base.name.clone(),
                source,
            })?;

        for host in self.base.hosts.clone() {
            let data = self.host_request_body_map.get(&host).cloned().ok_or_else(|| {
                self.base
                    .config_error(format!("host {} has no node in the database", host))
            })?;
            let mut request = HostHttpRequest::new(Method::Post);
            request.build_nma_endpoint("directories/delete");
            request.request_data = data;
            self.base.add_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let mut errors = HostErrors::new(&self.base.name);

        for (host, result) in self.base.sorted_results() {
            self.base.log_response(&host, &result);

            if result.is_passing() {
                // {"/data/test_db": "deleted", ...}
                if let Err(err) = self.base.parse_and_check_map_response(&host, result.content()) {
                    errors.push(&host, err);
                }
            } else if let Some(err) = result.err() {
                errors.push(&host, err.clone());
            }
        }

        errors.into_result()
    }
}
