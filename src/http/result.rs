//! Result of one host's request and its classification
//!
//! The status code is the single source of truth: every predicate here is a
//! pure function of the code and the (optional) error, and the constructors
//! guarantee that a non-2xx code always carries an error.

use std::fmt;

use super::errors::HostError;

pub const SUCCESS_CODE: u16 = 200;
pub const MULTIPLE_CHOICE_CODE: u16 = 300;
pub const UNAUTHORIZED_CODE: u16 = 401;
pub const INTERNAL_ERROR_CODE: u16 = 500;

/// Substrings the HTTPS service puts in a 401 body when credentials are wrong,
/// as opposed to the node simply not having joined the cluster yet.
const WRONG_CREDENTIAL_ERR_MSG: [&str; 2] = ["Wrong password", "Wrong certificate"];

/// Coarse outcome of a host request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    /// The service answered with an error status
    Failure,
    /// No answer was received (timeout, refused connection, ...)
    Exception,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "SUCCESS",
            ResultStatus::Failure | ResultStatus::Exception => "FAILURE",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one host returned for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostHttpResult {
    host: String,
    /// 0 when no response was received
    status_code: u16,
    content: String,
    err: Option<HostError>,
}

impl HostHttpResult {
    /// Build a result from a received response.
    pub fn from_response(host: &str, status_code: u16, content: String) -> Self {
        let err = if (SUCCESS_CODE..MULTIPLE_CHOICE_CODE).contains(&status_code) {
            None
        } else {
            Some(HostError::HttpStatus {
                code: status_code,
                body: content.clone(),
            })
        };
        Self {
            host: host.to_string(),
            status_code,
            content,
            err,
        }
    }

    /// Build a result for a request that never produced a usable response.
    pub fn from_error(host: &str, err: HostError) -> Self {
        Self {
            host: host.to_string(),
            status_code: 0,
            content: String::new(),
            err: Some(err),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn err(&self) -> Option<&HostError> {
        self.err.as_ref()
    }

    pub fn status(&self) -> ResultStatus {
        match &self.err {
            None => ResultStatus::Success,
            Some(_) if self.status_code == 0 => ResultStatus::Exception,
            Some(_) => ResultStatus::Failure,
        }
    }

    pub fn is_passing(&self) -> bool {
        self.err.is_none()
    }

    pub fn is_failing(&self) -> bool {
        self.status() == ResultStatus::Failure
    }

    pub fn is_exception(&self) -> bool {
        self.status() == ResultStatus::Exception
    }

    pub fn is_success(&self) -> bool {
        self.status_code == SUCCESS_CODE
    }

    /// A 401 covers wrong password, wrong certificate, and a node that has
    /// not joined the cluster yet.
    pub fn is_unauthorized_request(&self) -> bool {
        self.status_code == UNAUTHORIZED_CODE
    }

    pub fn is_internal_error(&self) -> bool {
        self.status_code == INTERNAL_ERROR_CODE
    }

    pub fn is_timeout(&self) -> bool {
        self.err.as_ref().is_some_and(HostError::is_timeout)
    }

    /// The service answered at all, even if only to refuse the request
    pub fn is_http_running(&self) -> bool {
        self.is_passing() || self.is_unauthorized_request() || self.is_internal_error()
    }

    /// Narrows a 401 down to bad credentials supplied by the user.
    pub fn is_password_and_certificate_error(&self) -> bool {
        if !self.is_unauthorized_request() {
            return false;
        }
        let detail = match &self.err {
            Some(err) => format!("{} {}", self.content, err),
            None => self.content.clone(),
        };
        WRONG_CREDENTIAL_ERR_MSG.iter().any(|msg| detail.contains(msg))
    }
}
