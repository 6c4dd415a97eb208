use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::{error, info, Logger};

use super::base::{ClusterOp, OpBase};
use super::context::OpEngineExecContext;
use super::errors::{HostErrors, OpError};
use super::masking::SensitiveFields;
use crate::coordinator::{BootstrapOptions, VCoordinationDatabase};
use crate::http::{HostError, HostHttpRequest, Method};

const RETURN_CODE_FIELD: &str = "bootstrap_catalog_return_code";

#[derive(Debug, Clone, Serialize)]
struct BootstrapCatalogRequestData {
    db_name: String,
    host: String,
    node_name: String,
    catalog_path: String,
    storage_location: String,
    port_number: u16,
    control_addr: String,
    broadcast_addr: String,
    /// Left empty: the agent derives it from the client port
    spread_port: String,
    large_cluster: i32,
    networking_mode: String,
    spread_logging: bool,
    spread_logging_level: i32,
    ipv6: bool,
    num_shards: u32,
    #[serde(rename = "communal_storage")]
    communal_storage_url: String,
    #[serde(flatten)]
    sensitive: SensitiveFields,
}

/// Bootstraps the catalog on the given hosts (usually just one).
///
/// The request body needs each host's broadcast address, so a network
/// profile operation must run earlier in the same pipeline.
pub struct NmaBootstrapCatalogOp {
    base: OpBase,
    host_request_body_map: HashMap<String, BootstrapCatalogRequestData>,
}

impl NmaBootstrapCatalogOp {
    pub fn new(
        vdb: &VCoordinationDatabase,
        options: &BootstrapOptions,
        bootstrap_hosts: Vec<String>,
        logger: &Logger,
    ) -> Result<Self, OpError> {
        let mut op = Self {
            base: OpBase::new("NMABootstrapCatalogOp", bootstrap_hosts, logger),
            host_request_body_map: HashMap::new(),
        };
        op.setup_request_body(vdb, options)?;
        Ok(op)
    }

    fn setup_request_body(
        &mut self,
        vdb: &VCoordinationDatabase,
        options: &BootstrapOptions,
    ) -> Result<(), OpError> {
        for host in &self.base.hosts {
            let vnode = vdb.node(host).ok_or_else(|| {
                self.base
                    .config_error(format!("host {} is not part of database {}", host, vdb.name))
            })?;
            let storage_location = vnode
                .storage_locations
                .first()
                .ok_or_else(|| self.base.config_error("the storage locations is empty"))?;

            let data = BootstrapCatalogRequestData {
                db_name: vdb.name.clone(),
                host: host.clone(),
                node_name: vnode.name.clone(),
                catalog_path: vnode.catalog_path.clone(),
                storage_location: storage_location.clone(),
                port_number: vnode.port,
                control_addr: vnode.address.clone(),
                broadcast_addr: String::new(),
                spread_port: String::new(),
                large_cluster: options.large_cluster,
                networking_mode: options.networking_mode().to_string(),
                spread_logging: options.spread_logging,
                spread_logging_level: options.spread_logging_level,
                ipv6: options.ipv6,
                num_shards: vdb.num_shards,
                communal_storage_url: vdb.communal_storage_location.clone(),
                sensitive: SensitiveFields {
                    db_password: options.password.clone(),
                    aws_access_key_id: vdb.aws_id_key.clone(),
                    aws_secret_access_key: vdb.aws_secret_key.clone(),
                    parameters: options.configuration_parameters.clone(),
                },
            };
            self.host_request_body_map.insert(host.clone(), data);
        }
        Ok(())
    }

    /// Fill in broadcast addresses and serialize the bodies
    fn update_request_body(
        &mut self,
        ctx: &OpEngineExecContext,
    ) -> Result<HashMap<String, String>, OpError> {
        let mut marshaled = HashMap::new();

        for host in &self.base.hosts {
            let profile = ctx.network_profile(host).ok_or_else(|| {
                self.base
                    .config_error(format!("no network profile known for host {}", host))
            })?;
            let body = self
                .host_request_body_map
                .get_mut(host)
                .ok_or_else(|| OpError::config(&self.base.name, format!("no request body for host {}", host)))?;
            body.broadcast_addr = profile.broadcast.clone();

            let data = serde_json::to_string(body).map_err(|e| {
                OpError::config(
                    &self.base.name,
                    format!("fail to marshal request data to JSON string: {}", e),
                )
            })?;
            marshaled.insert(host.clone(), data);

            let mut masked = body.clone();
            masked.sensitive.mask_sensitive_info(&ctx.config.sensitive);
            info!(self.base.logger, "Request data"; "host" => host, "data" => ?masked);
        }

        Ok(marshaled)
    }

    fn check_return_code(&self, host: &str, content: &str) -> Result<(), HostError> {
        let response = self.base.parse_and_check_map_response(host, content)?;
        match response.get(RETURN_CODE_FIELD) {
            None => Err(HostError::Response(format!(
                "response does not contain the field \"{}\"",
                RETURN_CODE_FIELD
            ))),
            Some(code) if code != "0" => Err(HostError::Response(format!(
                "{} should be 0 but got {}",
                RETURN_CODE_FIELD, code
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaBootstrapCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let marshaled = self.update_request_body(ctx)?;

        ctx.dispatcher
            .setup(&self.base.hosts)
            .map_err(|source| OpError::Dispatch {
                op: self.base.name.clone(),
                source,
            })?;

        for (host, data) in marshaled {
            let mut request = HostHttpRequest::new(Method::Post);
            request.build_nma_endpoint("catalog/bootstrap");
            request.request_data = data;
            self.base.add_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let mut errors = HostErrors::new(&self.base.name);

        for (host, result) in self.base.sorted_results() {
            self.base.log_response(&host, &result);

            if !result.is_passing() {
                if let Some(err) = result.err() {
                    errors.push(&host, err.clone());
                }
                continue;
            }

            if let Err(err) = self.check_return_code(&host, result.content()) {
                error!(self.base.logger, "Catalog bootstrap failed"; "host" => &host, "error" => %err);
                errors.push(&host, err);
            }
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::Value;

    use crate::config::{EngineConfig, MASKED_VALUE};
    use crate::coordinator::VCoordinationNode;
    use crate::ops::context::NetworkProfile;
    use crate::ops::OpEngine;
    use crate::testing::{create_test_logger, MockAdapterFactory, MockResponse};

    const HOST: &str = "192.168.1.101";

    fn vdb() -> VCoordinationDatabase {
        let mut vdb = VCoordinationDatabase::new("test_db");
        vdb.communal_storage_location = "s3://bucket/test_db".to_string();
        vdb.num_shards = 6;
        vdb.aws_id_key = "AKIAEXAMPLE".to_string();
        vdb.aws_secret_key = "aws-secret".to_string();
        vdb.add_node(
            HOST,
            VCoordinationNode::new("v_test_db_node0001", HOST)
                .with_catalog_path("/catalog/test_db/v_test_db_node0001_catalog")
                .with_storage_location("/data/test_db/v_test_db_node0001_data"),
        );
        vdb
    }

    fn options() -> BootstrapOptions {
        BootstrapOptions::default()
            .with_password("db-secret")
            .with_parameter("AWSAuth", "id:aws-auth-secret")
            .with_parameter("awsregion", "us-east-1")
    }

    fn context(factory: Arc<MockAdapterFactory>, with_profile: bool) -> OpEngineExecContext {
        let mut ctx = OpEngineExecContext::new(
            Arc::new(EngineConfig::default()),
            factory,
            &create_test_logger(),
        );
        if with_profile {
            ctx.network_profiles.insert(
                HOST.to_string(),
                NetworkProfile {
                    name: "eth0".into(),
                    address: HOST.into(),
                    subnet: "192.168.0.0/16".into(),
                    netmask: "255.255.0.0".into(),
                    broadcast: "192.168.255.255".into(),
                },
            );
        }
        ctx
    }

    async fn run(op: NmaBootstrapCatalogOp, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let logger = create_test_logger();
        let mut engine = OpEngine::new(
            vec![Box::new(op) as Box<dyn ClusterOp>],
            vec![HOST.to_string()],
            &logger,
        );
        engine.run(ctx).await
    }

    #[tokio::test]
    async fn test_bootstrap_sends_full_body() {
        let factory = Arc::new(MockAdapterFactory::new().with_response(
            HOST,
            MockResponse::ok(r#"{"bootstrap_catalog_stdout":"Catalog successfully bootstrapped","bootstrap_catalog_stderr":"","bootstrap_catalog_return_code":"0"}"#),
        ));
        let mut ctx = context(factory.clone(), true);
        let op = NmaBootstrapCatalogOp::new(&vdb(), &options(), vec![HOST.to_string()], &create_test_logger()).unwrap();
        run(op, &mut ctx).await.unwrap();

        let calls = factory.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].endpoint, "v1/catalog/bootstrap");

        // the wire body carries the real credentials
        let body: Value = serde_json::from_str(&calls[0].request_data).unwrap();
        assert_eq!(body["db_name"], "test_db");
        assert_eq!(body["node_name"], "v_test_db_node0001");
        assert_eq!(body["storage_location"], "/data/test_db/v_test_db_node0001_data");
        assert_eq!(body["broadcast_addr"], "192.168.255.255");
        assert_eq!(body["control_addr"], HOST);
        assert_eq!(body["networking_mode"], "pt2pt");
        assert_eq!(body["communal_storage"], "s3://bucket/test_db");
        assert_eq!(body["num_shards"], 6);
        assert_eq!(body["db_password"], "db-secret");
        assert_eq!(body["aws_secret_access_key"], "aws-secret");
        assert_eq!(body["parameters"]["AWSAuth"], "id:aws-auth-secret");
        assert_ne!(body["db_password"], MASKED_VALUE);
    }

    #[tokio::test]
    async fn test_missing_network_profile_is_config_error() {
        let factory = Arc::new(MockAdapterFactory::new());
        let mut ctx = context(factory.clone(), false);
        let op = NmaBootstrapCatalogOp::new(&vdb(), &options(), vec![HOST.to_string()], &create_test_logger()).unwrap();

        let err = run(op, &mut ctx).await.unwrap_err();
        assert!(matches!(err, OpError::Config { .. }));
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn test_empty_storage_locations_rejected() {
        let mut vdb = VCoordinationDatabase::new("test_db");
        vdb.add_node(HOST, VCoordinationNode::new("v_test_db_node0001", HOST));

        let result = NmaBootstrapCatalogOp::new(&vdb, &options(), vec![HOST.to_string()], &create_test_logger());
        match result {
            Err(OpError::Config { message, .. }) => assert!(message.contains("storage locations is empty")),
            _ => panic!("Expected a config error"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_return_code_fails() {
        let factory = Arc::new(MockAdapterFactory::new().with_response(
            HOST,
            MockResponse::ok(r#"{"bootstrap_catalog_stderr":"no space","bootstrap_catalog_return_code":"1"}"#),
        ));
        let mut ctx = context(factory, true);
        let op = NmaBootstrapCatalogOp::new(&vdb(), &options(), vec![HOST.to_string()], &create_test_logger()).unwrap();

        let err = run(op, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("should be 0 but got 1"));
        assert_eq!(err.failed_hosts(), vec![HOST]);
    }

    #[tokio::test]
    async fn test_missing_return_code_fails() {
        let factory = Arc::new(MockAdapterFactory::new().with_response(HOST, MockResponse::ok("{}")));
        let mut ctx = context(factory, true);
        let op = NmaBootstrapCatalogOp::new(&vdb(), &options(), vec![HOST.to_string()], &create_test_logger()).unwrap();

        let err = run(op, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("does not contain the field"));
    }
}
