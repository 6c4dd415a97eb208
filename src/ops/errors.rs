//! Error types for cluster operations

use std::fmt;

use thiserror::Error;

use crate::http::{DispatchError, HostError};

/// One host's contribution to an operation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub host: String,
    pub error: HostError,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host {}: {}", self.host, self.error)
    }
}

/// All host failures of one operation, kept as (host, error) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostErrors {
    op: String,
    failures: Vec<HostFailure>,
}

impl HostErrors {
    pub fn new(op: &str) -> Self {
        Self {
            op: op.to_string(),
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, host: &str, error: HostError) {
        self.failures.push(HostFailure {
            host: host.to_string(),
            error,
        });
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn failures(&self) -> &[HostFailure] {
        &self.failures
    }

    /// Hosts that failed, sorted, without duplicates
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.failures.iter().map(|f| f.host.as_str()).collect();
        hosts.sort_unstable();
        hosts.dedup();
        hosts
    }

    pub fn error_for(&self, host: &str) -> Option<&HostError> {
        self.failures
            .iter()
            .find(|f| f.host == host)
            .map(|f| &f.error)
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise the joined error
    pub fn into_result(self) -> Result<(), OpError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(OpError::Hosts(self))
        }
    }
}

impl fmt::Display for HostErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} host failure(s)", self.op, self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

/// Errors that abort an operation, and with it the pipeline
#[derive(Debug, Error)]
pub enum OpError {
    /// Bad or missing input detected before anything is sent
    #[error("[{op}] {message}")]
    Config { op: String, message: String },

    /// The dispatch itself could not be carried out
    #[error("[{op}] fail to dispatch request: {source}")]
    Dispatch {
        op: String,
        #[source]
        source: DispatchError,
    },

    /// One or more hosts failed
    #[error("{0}")]
    Hosts(HostErrors),

    /// A host rejected the credentials; the remaining hosts would too
    #[error("[{op}] unauthorized request on host {host}: {error}")]
    Unauthorized {
        op: String,
        host: String,
        error: HostError,
    },

    /// Too few primary nodes are in the required state
    #[error(
        "[{op}] quorum check failed: {available} host(s) available, \
         {required} of {primary_count} primary node(s) required"
    )]
    Quorum {
        op: String,
        available: usize,
        required: usize,
        primary_count: usize,
    },

    /// Local filesystem failure
    #[error("[{op}] {message}: {source}")]
    Io {
        op: String,
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl OpError {
    pub fn config(op: &str, message: impl Into<String>) -> Self {
        OpError::Config {
            op: op.to_string(),
            message: message.into(),
        }
    }

    /// Hosts whose failure caused this error
    pub fn failed_hosts(&self) -> Vec<&str> {
        match self {
            OpError::Hosts(errors) => errors.hosts(),
            OpError::Unauthorized { host, .. } => vec![host.as_str()],
            _ => Vec::new(),
        }
    }
}
