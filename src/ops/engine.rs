//! Pipeline runner: executes an ordered list of operations against one
//! execution context.

use slog::{error, info, o, Logger};
use uuid::Uuid;

use super::base::ClusterOp;
use super::context::OpEngineExecContext;
use super::errors::OpError;
use crate::http::HttpsCerts;

/// Runs `prepare → execute → finalize` for each operation in order.
///
/// The first operation that fails aborts the run; nothing is retried or
/// rolled back.
pub struct OpEngine {
    ops: Vec<Box<dyn ClusterOp>>,
    hosts: Vec<String>,
    certs: Option<HttpsCerts>,
    logger: Logger,
}

impl OpEngine {
    pub fn new(ops: Vec<Box<dyn ClusterOp>>, hosts: Vec<String>, logger: &Logger) -> Self {
        Self {
            ops,
            hosts,
            certs: None,
            logger: logger.new(o!("component" => "OpEngine")),
        }
    }

    /// Attach TLS material to every request the pipeline sends
    pub fn with_certs(mut self, certs: HttpsCerts) -> Self {
        self.certs = Some(certs);
        self
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub async fn run(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let logger = self
            .logger
            .new(o!("run_id" => Uuid::new_v4().to_string()));

        info!(logger, "Running pipeline";
            "ops" => self.ops.len(),
            "hosts" => self.hosts.join(",")
        );

        // Warm the pool for the full host set; operations narrow it in prepare.
        if !self.hosts.is_empty() {
            ctx.dispatcher
                .setup(&self.hosts)
                .map_err(|source| OpError::Dispatch {
                    op: "OpEngine".to_string(),
                    source,
                })?;
        }

        for op in self.ops.iter_mut() {
            if let Err(e) = Self::run_op(op.as_mut(), self.certs.as_ref(), ctx).await {
                error!(logger, "Pipeline aborted"; "op" => op.name(), "error" => %e);
                return Err(e);
            }
        }

        info!(logger, "Pipeline completed");
        Ok(())
    }

    async fn run_op(
        op: &mut dyn ClusterOp,
        certs: Option<&HttpsCerts>,
        ctx: &mut OpEngineExecContext,
    ) -> Result<(), OpError> {
        op.setup_basic_info();

        op.base().log_prepare();
        op.prepare(ctx)?;

        if op.is_skip_execute() {
            info!(op.base().logger, "Execute skipped");
        } else {
            op.load_certs_if_needed(certs)?;
            op.base().log_execute();
            op.execute(ctx).await?;
        }

        op.base().log_finalize();
        op.finalize(ctx)
    }
}
