use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use slog::{error, info, warn, Logger};

use super::base::{ClusterOp, OpBase};
use super::context::OpEngineExecContext;
use super::errors::{HostErrors, OpError};
use crate::config::EngineConfig;
use crate::http::{HostHttpRequest, Method};

/// Downloads one batch of diagnostic tarballs, one file per host, into
/// `<output_root>/<id>/<node name>-<batch>.tgz`.
pub struct NmaGetScrutinizeTarOp {
    base: OpBase,
    id: String,
    batch: String,
    host_node_name_map: HashMap<String, String>,
    output_dir: PathBuf,
}

impl NmaGetScrutinizeTarOp {
    /// Creates the output directory; `hosts` and `host_node_name_map` must
    /// name exactly the same hosts.
    pub fn new(
        id: &str,
        batch: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
        output_root: &Path,
        logger: &Logger,
    ) -> Result<Self, OpError> {
        let base = OpBase::new("NMAGetScrutinizeTarOp", hosts, logger);
        validate_host_maps(&base.name, &base.hosts, &host_node_name_map)?;

        let op = Self {
            base,
            id: id.to_string(),
            batch: batch.to_string(),
            host_node_name_map,
            output_dir: output_root.join(id),
        };
        op.create_output_dir()?;
        Ok(op)
    }

    /// Same as [`NmaGetScrutinizeTarOp::new`], collecting under the
    /// configured `scrutinize_output_root`.
    pub fn with_config(
        id: &str,
        batch: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
        config: &EngineConfig,
        logger: &Logger,
    ) -> Result<Self, OpError> {
        Self::new(
            id,
            batch,
            hosts,
            host_node_name_map,
            &config.scrutinize_output_root,
            logger,
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination of `host`'s tarball
    pub fn tarball_path(&self, host: &str) -> PathBuf {
        let node = self
            .host_node_name_map
            .get(host)
            .map(String::as_str)
            .unwrap_or(host);
        self.output_dir.join(format!("{}-{}.tgz", node, self.batch))
    }

    fn create_output_dir(&self) -> Result<(), OpError> {
        let io_error = |message: String, source: std::io::Error| OpError::Io {
            op: self.base.name.clone(),
            message,
            source,
        };

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.output_dir).map_err(|e| {
            io_error(
                format!("opening scrutinize output directory failed: '{}'", self.output_dir.display()),
                e,
            )
        })?;

        let metadata = std::fs::metadata(&self.output_dir).map_err(|e| {
            io_error(
                format!("opening scrutinize output directory failed: '{}'", self.output_dir.display()),
                e,
            )
        })?;
        if metadata.permissions().readonly() {
            return Err(self.base.config_error(format!(
                "scrutinize output directory not writeable: '{}'",
                self.output_dir.display()
            )));
        }
        Ok(())
    }
}

fn validate_host_maps(
    op: &str,
    hosts: &[String],
    host_node_name_map: &HashMap<String, String>,
) -> Result<(), OpError> {
    for host in hosts {
        if !host_node_name_map.contains_key(host) {
            return Err(OpError::config(op, format!("host {} has no node name", host)));
        }
    }
    if host_node_name_map.len() != hosts.len() {
        let mut extra: Vec<&str> = host_node_name_map
            .keys()
            .filter(|h| !hosts.contains(*h))
            .map(String::as_str)
            .collect();
        extra.sort_unstable();
        return Err(OpError::config(
            op,
            format!("node names given for unknown host(s): {}", extra.join(", ")),
        ));
    }
    Ok(())
}

#[async_trait]
impl ClusterOp for NmaGetScrutinizeTarOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let host_to_file_path: HashMap<String, PathBuf> = self
            .base
            .hosts
            .iter()
            .map(|host| (host.clone(), self.tarball_path(host)))
            .collect();

        ctx.dispatcher
            .setup_for_download(&self.base.hosts, &host_to_file_path)
            .map_err(|source| OpError::Dispatch {
                op: self.base.name.clone(),
                source,
            })?;

        let endpoint = format!("scrutinize/{}/{}", self.id, self.batch);
        for host in self.base.hosts.clone() {
            let mut request = HostHttpRequest::new(Method::Get);
            request.build_nma_endpoint(&endpoint);
            self.base.add_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let mut errors = HostErrors::new(&self.base.name);

        for (host, result) in self.base.sorted_results() {
            self.base.log_response(&host, &result);
            let node = self
                .host_node_name_map
                .get(&host)
                .cloned()
                .unwrap_or_default();

            if result.is_passing() {
                info!(self.base.logger, "Retrieved tarball";
                    "host" => &host, "node" => &node, "batch" => &self.batch);
                continue;
            }

            if result.is_internal_error() {
                warn!(self.base.logger, "Failed to tar batch on host, skipping";
                    "host" => &host, "node" => &node, "batch" => &self.batch);
                continue;
            }

            if let Some(err) = result.err() {
                error!(self.base.logger, "Failed to retrieve tarball";
                    "host" => &host, "node" => &node, "batch" => &self.batch, "error" => %err);
                errors.push(&host, err.clone());
            }
        }

        errors.into_result()
    }
}
