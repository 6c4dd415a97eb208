//! Operation lifecycle contract and the fields and helpers every operation
//! shares.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use slog::{debug, error, info, o, Logger};

use super::context::OpEngineExecContext;
use super::errors::OpError;
use super::masking::mask_request_body;
use crate::http::{ClusterHttpRequest, HostError, HostHttpRequest, HostHttpResult, HttpsCerts};

/// Flat string map returned by simple management-agent endpoints
pub type OpResponseMap = HashMap<String, String>;

/// `status` value the HTTPS service uses for success inside a payload
const RESP_SUCC_STATUS_CODE: i64 = 0;

/// Status block embedded in some HTTPS service payloads
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HttpsResponseStatus {
    #[serde(rename = "status")]
    pub status_code: i64,
}

/// Number of primaries that must be available: a strict majority.
///
/// With no primary nodes there is nothing to protect and no host is needed.
pub fn quorum_count(primary_node_count: usize) -> usize {
    if primary_node_count == 0 {
        0
    } else {
        primary_node_count / 2 + 1
    }
}

/// Whether `host_count` available primaries are a majority of
/// `primary_node_count`
pub fn has_quorum(host_count: usize, primary_node_count: usize) -> bool {
    host_count >= quorum_count(primary_node_count)
}

/// Names of the fields whose value is empty, as a parse failure
pub fn check_missing_fields(fields: &[(&str, &str)]) -> Result<(), HostError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HostError::Parse(format!(
            "missing or empty field(s): {}",
            missing.join(", ")
        )))
    }
}

/// Base fields embedded in every operation
pub struct OpBase {
    pub name: String,
    pub hosts: Vec<String>,
    pub cluster_http_request: ClusterHttpRequest,
    /// Set during `prepare` when there is nothing to do
    pub skip_execute: bool,
    pub logger: Logger,
}

impl OpBase {
    pub fn new(name: &str, hosts: Vec<String>, logger: &Logger) -> Self {
        Self {
            name: name.to_string(),
            hosts,
            cluster_http_request: ClusterHttpRequest::new(name),
            skip_execute: false,
            logger: logger.new(o!("op" => name.to_string())),
        }
    }

    /// Reset the cluster request (name, version tag, empty collections)
    pub fn setup_basic_info(&mut self) {
        self.cluster_http_request = ClusterHttpRequest::new(&self.name);
    }

    /// Register the request for `host`
    pub fn add_request(&mut self, host: &str, request: HostHttpRequest) {
        self.cluster_http_request
            .request_collection
            .insert(host.to_string(), request);
    }

    pub fn results(&self) -> &HashMap<String, HostHttpResult> {
        &self.cluster_http_request.result_collection
    }

    /// Results ordered by host, so "first host" means the same thing every run
    pub fn sorted_results(&self) -> Vec<(String, HostHttpResult)> {
        let mut results: Vec<(String, HostHttpResult)> = self
            .cluster_http_request
            .result_collection
            .iter()
            .map(|(host, result)| (host.clone(), result.clone()))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    pub fn config_error(&self, message: impl Into<String>) -> OpError {
        OpError::config(&self.name, message)
    }

    /// Attach TLS material to every request of this operation.
    ///
    /// Runs after `prepare`, so an operation without requests is a bug.
    pub fn load_certs_if_needed(&mut self, certs: Option<&HttpsCerts>) -> Result<(), OpError> {
        let Some(certs) = certs else {
            return Ok(());
        };

        if self.cluster_http_request.request_collection.is_empty() {
            return Err(self.config_error("has not set up a http request"));
        }

        for request in self.cluster_http_request.request_collection.values_mut() {
            request.use_certs_in_options = true;
            request.certs = certs.clone();
        }
        Ok(())
    }

    /// Dispatch the prepared requests and wait for every host.
    pub async fn run_execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        for host in &self.hosts {
            if !self.cluster_http_request.request_collection.contains_key(host) {
                return Err(self.config_error(format!("no request prepared for host {}", host)));
            }
        }

        for (host, request) in &self.cluster_http_request.request_collection {
            debug!(self.logger, "Request prepared";
                "host" => host,
                "method" => request.method.as_str(),
                "endpoint" => &request.endpoint,
                "body" => mask_request_body(&request.request_data, &ctx.config.sensitive)
            );
        }

        ctx.dispatcher
            .send_request(&mut self.cluster_http_request)
            .await
            .map_err(|source| {
                error!(self.logger, "Fail to dispatch request"; "error" => %source);
                OpError::Dispatch {
                    op: self.name.clone(),
                    source,
                }
            })
    }

    /// Decode a JSON response body into `T`
    pub fn parse_and_check_response<T>(&self, host: &str, content: &str) -> Result<T, HostError>
    where
        T: DeserializeOwned + Debug,
    {
        match serde_json::from_str::<T>(content) {
            Ok(response) => {
                info!(self.logger, "JSON response"; "host" => host, "response" => ?response);
                Ok(response)
            }
            Err(e) => {
                error!(self.logger, "Fail to parse response on host"; "host" => host, "error" => %e);
                Err(HostError::Parse(e.to_string()))
            }
        }
    }

    pub fn parse_and_check_map_response(
        &self,
        host: &str,
        content: &str,
    ) -> Result<OpResponseMap, HostError> {
        self.parse_and_check_response(host, content)
    }

    /// HTTPS service payloads report their own status; anything but 0 failed
    pub fn check_response_status_code(
        &self,
        resp: HttpsResponseStatus,
        host: &str,
    ) -> Result<(), HostError> {
        if resp.status_code != RESP_SUCC_STATUS_CODE {
            let err = HostError::Response(format!(
                "[{}] fail to execute HTTPS request on host {}, status code in HTTPS response is {}",
                self.name, host, resp.status_code
            ));
            error!(self.logger, "Fail to execute HTTPS request"; "error" => %err);
            return Err(err);
        }
        Ok(())
    }

    /// Logs and answers whether enough primaries are available
    pub fn has_quorum(&self, host_count: usize, primary_node_count: usize) -> bool {
        if !has_quorum(host_count, primary_node_count) {
            error!(self.logger, "Quorum check failed";
                "hosts_with_latest_catalog" => host_count,
                "primary_nodes" => primary_node_count,
                "required" => quorum_count(primary_node_count)
            );
            return false;
        }
        true
    }

    pub fn check_quorum(&self, host_count: usize, primary_node_count: usize) -> Result<(), OpError> {
        if self.has_quorum(host_count, primary_node_count) {
            Ok(())
        } else {
            Err(OpError::Quorum {
                op: self.name.clone(),
                available: host_count,
                required: quorum_count(primary_node_count),
                primary_count: primary_node_count,
            })
        }
    }

    pub fn log_response(&self, host: &str, result: &HostHttpResult) {
        match result.err() {
            Some(err) => error!(self.logger, "Request failed";
                "host" => host,
                "summary" => result.status().as_str(),
                "status_code" => result.status_code(),
                "error" => %err
            ),
            None => info!(self.logger, "Request succeeded";
                "host" => host,
                "status_code" => result.status_code()
            ),
        }
    }

    pub fn log_prepare(&self) {
        info!(self.logger, "Prepare() called");
    }

    pub fn log_execute(&self) {
        info!(self.logger, "Execute() called");
    }

    pub fn log_finalize(&self) {
        info!(self.logger, "Finalize() called");
    }
}

/// Credentials for operations talking to the HTTPS service.
///
/// A password may legitimately be absent (a fresh database has none), so
/// password auth is requested explicitly.
#[derive(Clone, Default)]
pub struct OpHttpsBase {
    pub use_http_password: bool,
    pub user_name: String,
    pub https_password: Option<String>,
}

impl OpHttpsBase {
    pub fn validate_and_set_username_and_password(
        &mut self,
        op_name: &str,
        use_http_password: bool,
        user_name: &str,
        https_password: Option<&str>,
    ) -> Result<(), OpError> {
        self.use_http_password = use_http_password;
        if use_http_password {
            if user_name.is_empty() {
                return Err(OpError::config(
                    op_name,
                    "should provide a username for http basic authentication",
                ));
            }
            self.user_name = user_name.to_string();
            self.https_password = https_password.map(|p| p.to_string());
        }
        Ok(())
    }

    /// Add basic auth to `request` when password auth is in use
    pub fn apply_auth(&self, request: &mut HostHttpRequest) {
        if self.use_http_password {
            request.username = Some(self.user_name.clone());
            request.password = Some(self.https_password.clone().unwrap_or_default());
        }
    }
}

impl std::fmt::Debug for OpHttpsBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpHttpsBase")
            .field("use_http_password", &self.use_http_password)
            .field("user_name", &self.user_name)
            .finish()
    }
}

/// Lifecycle every cluster operation implements.
///
/// The engine drives `prepare → execute → finalize` strictly in order;
/// `execute` dispatches and then calls `process_result`.
#[async_trait]
pub trait ClusterOp: Send {
    fn base(&self) -> &OpBase;

    fn base_mut(&mut self) -> &mut OpBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    /// Set up the dispatcher for this operation's hosts and build its requests
    fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError>;

    async fn execute(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        self.base_mut().run_execute(ctx).await?;
        self.process_result(ctx)
    }

    /// Inspect every host's result, record facts in `ctx`
    fn process_result(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError>;

    fn finalize(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        Ok(())
    }

    fn is_skip_execute(&self) -> bool {
        self.base().skip_execute
    }

    fn setup_basic_info(&mut self) {
        self.base_mut().setup_basic_info();
    }

    fn load_certs_if_needed(&mut self, certs: Option<&HttpsCerts>) -> Result<(), OpError> {
        self.base_mut().load_certs_if_needed(certs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::create_test_logger;

    fn base(hosts: &[&str]) -> OpBase {
        OpBase::new(
            "TestOp",
            hosts.iter().map(|h| h.to_string()).collect(),
            &create_test_logger(),
        )
    }

    #[test]
    fn test_quorum_arithmetic() {
        assert_eq!(quorum_count(5), 3);
        assert!(!has_quorum(2, 5));
        assert!(has_quorum(3, 5));

        assert_eq!(quorum_count(1), 1);
        assert!(!has_quorum(0, 1));
        assert!(has_quorum(1, 1));

        assert_eq!(quorum_count(0), 0);
        assert!(has_quorum(0, 0));

        assert_eq!(quorum_count(4), 3);
        assert!(!has_quorum(2, 4));
        assert_eq!(quorum_count(2), 2);
    }

    #[test]
    fn test_check_quorum_error() {
        let op = base(&["h1"]);
        assert!(op.check_quorum(3, 5).is_ok());
        match op.check_quorum(1, 3) {
            Err(OpError::Quorum {
                available,
                required,
                primary_count,
                ..
            }) => {
                assert_eq!(available, 1);
                assert_eq!(required, 2);
                assert_eq!(primary_count, 3);
            }
            other => panic!("Expected quorum error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_map_response() {
        let op = base(&["h1"]);
        let map = op
            .parse_and_check_map_response("h1", r#"{"/data/db":"deleted"}"#)
            .unwrap();
        assert_eq!(map["/data/db"], "deleted");

        let err = op.parse_and_check_map_response("h1", "<html>").unwrap_err();
        assert!(matches!(err, HostError::Parse(_)));

        // values must be strings
        assert!(op.parse_and_check_map_response("h1", r#"{"a":1}"#).is_err());
    }

    #[test]
    fn test_check_missing_fields() {
        assert!(check_missing_fields(&[("name", "eth0"), ("address", "10.0.0.1")]).is_ok());
        let err = check_missing_fields(&[("name", "eth0"), ("subnet", ""), ("broadcast", "")])
            .unwrap_err();
        assert_eq!(
            err,
            HostError::Parse("missing or empty field(s): subnet, broadcast".to_string())
        );
    }

    #[test]
    fn test_check_response_status_code() {
        let op = base(&["h1"]);
        assert!(op
            .check_response_status_code(HttpsResponseStatus { status_code: 0 }, "h1")
            .is_ok());
        let err = op
            .check_response_status_code(HttpsResponseStatus { status_code: 3 }, "h1")
            .unwrap_err();
        assert!(err.to_string().contains("status code in HTTPS response is 3"));
    }

    #[test]
    fn test_load_certs_if_needed() {
        let certs = HttpsCerts::new("key".into(), "cert".into(), "ca".into());

        let mut empty = base(&["h1"]);
        assert!(empty.load_certs_if_needed(None).is_ok());
        assert!(matches!(
            empty.load_certs_if_needed(Some(&certs)),
            Err(OpError::Config { .. })
        ));

        let mut op = base(&["h1", "h2"]);
        op.add_request("h1", HostHttpRequest::new(Method::Get));
        op.add_request("h2", HostHttpRequest::new(Method::Get));
        op.load_certs_if_needed(Some(&certs)).unwrap();
        for request in op.cluster_http_request.request_collection.values() {
            assert!(request.use_certs_in_options);
            assert_eq!(request.certs, certs);
        }
    }

    #[test]
    fn test_setup_basic_info_resets_request() {
        let mut op = base(&["h1"]);
        op.add_request("h1", HostHttpRequest::new(Method::Get));
        op.setup_basic_info();
        assert!(op.cluster_http_request.request_collection.is_empty());
        assert_eq!(op.cluster_http_request.name, "TestOp");
        assert_eq!(op.cluster_http_request.sem_ver, "1.0.0");
    }

    #[test]
    fn test_https_base_requires_username() {
        let mut https = OpHttpsBase::default();
        assert!(https
            .validate_and_set_username_and_password("Op", true, "", Some("pw"))
            .is_err());

        https
            .validate_and_set_username_and_password("Op", true, "dbadmin", None)
            .unwrap();
        let mut request = HostHttpRequest::new(Method::Get);
        https.apply_auth(&mut request);
        assert_eq!(request.username.as_deref(), Some("dbadmin"));
        assert_eq!(request.password.as_deref(), Some(""));

        let mut no_auth = OpHttpsBase::default();
        no_auth
            .validate_and_set_username_and_password("Op", false, "", None)
            .unwrap();
        let mut request = HostHttpRequest::new(Method::Get);
        no_auth.apply_auth(&mut request);
        assert!(request.username.is_none());
    }
}
