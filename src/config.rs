//! Configuration for the operation engine
//!
//! Describes where the two per-node services listen, how long a single host
//! request may take, and which request-body fields are treated as credentials
//! when request bodies are logged.

use std::path::PathBuf;
use std::time::Duration;

/// Default port of the node management agent
pub const DEFAULT_NMA_PORT: u16 = 5554;

/// Default port of the HTTPS service embedded in the database server
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// Default per-host transport timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Where downloaded scrutinize tarballs are collected
pub const DEFAULT_SCRUTINIZE_OUTPUT_ROOT: &str = "/tmp/scrutinize/remote";

/// Value written in place of any credential when a body is logged
pub const MASKED_VALUE: &str = "******";

/// Address details of one per-node REST service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Port the service listens on (same on every host)
    pub port: u16,

    /// Whether the service is reached over https
    pub tls: bool,
}

impl ServiceEndpoint {
    pub fn new(port: u16, tls: bool) -> Self {
        Self { port, tls }
    }

    /// Base URL of the service on `host`, e.g. `https://10.0.0.1:5554`
    pub fn base_url(&self, host: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        if host.contains(':') && !host.starts_with('[') {
            // bare ipv6 literal
            format!("{}://[{}]:{}", scheme, host, self.port)
        } else {
            format!("{}://{}:{}", scheme, host, self.port)
        }
    }
}

/// Deny-list used when masking request bodies for logs.
///
/// Body fields are matched exactly. Configuration parameter keys (entries of
/// the `parameters` object) are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct SensitiveParams {
    /// Top-level body fields holding credentials
    pub credential_fields: Vec<String>,

    /// Lower-case configuration parameter names holding credentials
    pub parameter_keys: Vec<String>,
}

impl Default for SensitiveParams {
    fn default() -> Self {
        Self {
            credential_fields: vec![
                "db_password".to_string(),
                "aws_access_key_id".to_string(),
                "aws_secret_access_key".to_string(),
            ],
            parameter_keys: vec![
                "awsauth".to_string(),
                "awssessiontoken".to_string(),
                "gcsauth".to_string(),
                "azurestoragecredentials".to_string(),
            ],
        }
    }
}

impl SensitiveParams {
    /// Add a credential-bearing body field
    pub fn with_credential_field(mut self, field: &str) -> Self {
        self.credential_fields.push(field.to_string());
        self
    }

    /// Add a credential-bearing configuration parameter name
    pub fn with_parameter_key(mut self, key: &str) -> Self {
        self.parameter_keys.push(key.to_lowercase());
        self
    }

    pub fn is_credential_field(&self, field: &str) -> bool {
        self.credential_fields.iter().any(|f| f == field)
    }

    pub fn is_sensitive_parameter(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.parameter_keys.iter().any(|k| *k == key)
    }
}

/// Configuration for one engine instance (one command invocation).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Node management agent endpoint
    pub nma: ServiceEndpoint,

    /// Embedded HTTPS service endpoint
    pub https: ServiceEndpoint,

    /// Transport timeout applied to requests that do not set their own
    pub request_timeout: Duration,

    /// Masking deny-list
    pub sensitive: SensitiveParams,

    /// Root directory for downloaded diagnostic bundles
    pub scrutinize_output_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nma: ServiceEndpoint::new(DEFAULT_NMA_PORT, true),
            https: ServiceEndpoint::new(DEFAULT_HTTPS_PORT, true),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sensitive: SensitiveParams::default(),
            scrutinize_output_root: PathBuf::from(DEFAULT_SCRUTINIZE_OUTPUT_ROOT),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node management agent endpoint.
    pub fn with_nma_endpoint(mut self, port: u16, tls: bool) -> Self {
        self.nma = ServiceEndpoint::new(port, tls);
        self
    }

    /// Set the embedded HTTPS service endpoint.
    pub fn with_https_endpoint(mut self, port: u16, tls: bool) -> Self {
        self.https = ServiceEndpoint::new(port, tls);
        self
    }

    /// Set the default per-host request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the masking deny-list.
    pub fn with_sensitive_params(mut self, sensitive: SensitiveParams) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// Set where scrutinize tarballs are downloaded to.
    pub fn with_scrutinize_output_root(mut self, root: PathBuf) -> Self {
        self.scrutinize_output_root = root;
        self
    }
}
