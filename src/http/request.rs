//! Request model for one cluster-wide dispatch

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::result::HostHttpResult;

/// Current endpoint version of the node management agent
pub const NMA_CUR_VERSION: &str = "v1/";

/// Current endpoint version of the embedded HTTPS service
pub const HTTPS_CUR_VERSION: &str = "v1/";

/// Version tag stamped on every cluster request
pub const DEFAULT_SEM_VER: &str = "1.0.0";

/// HTTP verbs used against the per-node services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Which per-node service a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Service {
    /// Node management agent
    #[default]
    Nma,
    /// HTTPS service embedded in the database server
    Https,
}

/// PEM-encoded TLS client material
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HttpsCerts {
    pub key: String,
    pub cert: String,
    pub ca_cert: String,
}

impl HttpsCerts {
    pub fn new(key: String, cert: String, ca_cert: String) -> Self {
        Self { key, cert, ca_cert }
    }

    pub fn has_identity(&self) -> bool {
        !self.key.is_empty() && !self.cert.is_empty()
    }
}

impl fmt::Debug for HttpsCerts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpsCerts")
            .field("key", &"<redacted>")
            .field("cert_len", &self.cert.len())
            .field("ca_cert_len", &self.ca_cert.len())
            .finish()
    }
}

/// Request sent to a single host.
#[derive(Clone, Default)]
pub struct HostHttpRequest {
    pub method: Method,
    pub service: Service,
    /// Versioned path relative to the service root, e.g. `v1/network-profiles`
    pub endpoint: String,
    pub query_params: HashMap<String, String>,
    /// JSON body; empty for requests without a body
    pub request_data: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_certs_in_options: bool,
    pub certs: HttpsCerts,
    /// Overrides the engine's default transport timeout
    pub timeout: Option<Duration>,
}

impl HostHttpRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Target the node management agent at `v1/<path>`
    pub fn build_nma_endpoint(&mut self, path: &str) {
        self.service = Service::Nma;
        self.endpoint = format!("{}{}", NMA_CUR_VERSION, path);
    }

    /// Target the embedded HTTPS service at `v1/<path>`
    pub fn build_https_endpoint(&mut self, path: &str) {
        self.service = Service::Https;
        self.endpoint = format!("{}{}", HTTPS_CUR_VERSION, path);
    }

    pub fn with_basic_auth(mut self, username: &str, password: Option<&str>) -> Self {
        self.username = Some(username.to_string());
        self.password = password.map(|p| p.to_string());
        self
    }
}

impl fmt::Debug for HostHttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // request_data and password are left out; callers log the masked body
        f.debug_struct("HostHttpRequest")
            .field("method", &self.method)
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("query_params", &self.query_params)
            .field("username", &self.username)
            .field("use_certs_in_options", &self.use_certs_in_options)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Host → request map for one operation, plus the results once dispatched.
#[derive(Debug, Clone, Default)]
pub struct ClusterHttpRequest {
    pub name: String,
    pub sem_ver: String,
    pub request_collection: HashMap<String, HostHttpRequest>,
    pub result_collection: HashMap<String, HostHttpResult>,
}

impl ClusterHttpRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sem_ver: DEFAULT_SEM_VER.to_string(),
            request_collection: HashMap::new(),
            result_collection: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_endpoints() {
        let mut request = HostHttpRequest::new(Method::Get);
        request.build_nma_endpoint("network-profiles");
        assert_eq!(request.endpoint, "v1/network-profiles");
        assert_eq!(request.service, Service::Nma);

        request.build_https_endpoint("subclusters");
        assert_eq!(request.endpoint, "v1/subclusters");
        assert_eq!(request.service, Service::Https);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut request = HostHttpRequest::new(Method::Post).with_basic_auth("dbadmin", Some("s3cret"));
        request.request_data = r#"{"db_password":"s3cret"}"#.to_string();
        request.certs = HttpsCerts::new("PRIVATE".into(), "CERT".into(), String::new());

        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("PRIVATE"));
        assert!(rendered.contains("dbadmin"));
    }

    #[test]
    fn test_cluster_request_defaults() {
        let request = ClusterHttpRequest::new("NMANetworkProfileOp");
        assert_eq!(request.sem_ver, "1.0.0");
        assert!(request.request_collection.is_empty());
        assert!(request.result_collection.is_empty());
    }
}
