//! Per-host error types

use thiserror::Error;

/// Failure of a single host within one dispatch.
///
/// The first four variants are produced by adapters while talking to the
/// host. `Parse` and `Response` are produced by operations when a host
/// answered successfully but the payload is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// Transport-level deadline exceeded
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure, TLS failure, broken body stream
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status code
    #[error("HTTP status {code}: {body}")]
    HttpStatus { code: u16, body: String },

    /// Writing a downloaded body to its destination failed
    #[error("failed to write download to {path}: {message}")]
    Download { path: String, message: String },

    /// Response body is not the JSON shape the operation expects
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Response is well-formed but its content is unacceptable
    #[error("{0}")]
    Response(String),
}

impl HostError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HostError::Timeout(_))
    }

    /// Whether the failure happened before any status code was received
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HostError::Timeout(_) | HostError::Transport(_) | HostError::Download { .. }
        )
    }
}

impl From<reqwest::Error> for HostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HostError::Timeout(err.to_string())
        } else {
            HostError::Transport(err.to_string())
        }
    }
}

/// Problems with a dispatch itself, as opposed to any single host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Nothing to send
    #[error("cluster request '{0}' has no host requests")]
    EmptyRequest(String),

    /// A host in the request map has no adapter in the pool
    #[error("no connection set up for host {0}")]
    MissingAdapter(String),

    /// A download was requested for a host without a destination path
    #[error("no download destination given for host {0}")]
    MissingDownloadPath(String),

    /// The HTTP client for a host could not be built
    #[error("failed to build HTTP client for host {host}: {reason}")]
    Client { host: String, reason: String },
}
