//! In-memory adapters for exercising dispatches and pipelines without a
//! network.
//!
//! `MockAdapterFactory` hands out adapters that answer with canned per-host
//! responses and record every request they receive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slog::{o, Drain, Logger};

use crate::http::{
    Adapter, AdapterFactory, DispatchError, HostError, HostHttpRequest, HostHttpResult, Method,
};

/// Logger writing to stdout, as used throughout the test suites
pub fn create_test_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

/// Canned answer of one mock host
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// The service answers with this status code and body
    Status { code: u16, body: String },
    /// The request exceeds its deadline
    Timeout,
    /// Nothing listens on the host
    Refused,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        MockResponse::Status {
            code: 200,
            body: body.to_string(),
        }
    }

    pub fn status(code: u16, body: &str) -> Self {
        MockResponse::Status {
            code,
            body: body.to_string(),
        }
    }
}

/// A request as seen by a mock host
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub host: String,
    pub method: Method,
    pub endpoint: String,
    pub query_params: HashMap<String, String>,
    pub request_data: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_certs_in_options: bool,
    pub download_path: Option<PathBuf>,
}

pub struct MockAdapterFactory {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    delays: HashMap<String, Duration>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    created: Arc<AtomicUsize>,
}

impl MockAdapterFactory {
    /// Hosts without a configured response answer `200 {}`
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::ok("{}"),
            delays: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_response(mut self, host: &str, response: MockResponse) -> Self {
        self.responses.insert(host.to_string(), response);
        self
    }

    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Make `host` answer only after `delay`
    pub fn with_delay(mut self, host: &str, delay: Duration) -> Self {
        self.delays.insert(host.to_string(), delay);
        self
    }

    /// Every request received so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_to(&self, host: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.host == host).collect()
    }

    pub fn adapters_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn build(&self, host: &str, download_path: Option<PathBuf>) -> Box<dyn Adapter> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockAdapter {
            host: host.to_string(),
            response: self
                .responses
                .get(host)
                .cloned()
                .unwrap_or_else(|| self.default_response.clone()),
            delay: self.delays.get(host).copied(),
            download_path,
            calls: self.calls.clone(),
        })
    }
}

impl Default for MockAdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterFactory for MockAdapterFactory {
    fn make_adapter(&self, host: &str) -> Result<Box<dyn Adapter>, DispatchError> {
        Ok(self.build(host, None))
    }

    fn make_download_adapter(
        &self,
        host: &str,
        file_path: &Path,
    ) -> Result<Box<dyn Adapter>, DispatchError> {
        Ok(self.build(host, Some(file_path.to_path_buf())))
    }
}

struct MockAdapter {
    host: String,
    response: MockResponse,
    delay: Option<Duration>,
    download_path: Option<PathBuf>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

#[async_trait]
impl Adapter for MockAdapter {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_download(&self) -> bool {
        self.download_path.is_some()
    }

    async fn send_request(&self, request: &HostHttpRequest) -> HostHttpResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                host: self.host.clone(),
                method: request.method,
                endpoint: request.endpoint.clone(),
                query_params: request.query_params.clone(),
                request_data: request.request_data.clone(),
                username: request.username.clone(),
                password: request.password.clone(),
                use_certs_in_options: request.use_certs_in_options,
                download_path: self.download_path.clone(),
            });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.response {
            MockResponse::Timeout => HostHttpResult::from_error(
                &self.host,
                HostError::Timeout(format!("request to {} timed out", self.host)),
            ),
            MockResponse::Refused => HostHttpResult::from_error(
                &self.host,
                HostError::Transport(format!("connection to {} refused", self.host)),
            ),
            MockResponse::Status { code, body } => match &self.download_path {
                Some(path) if (200..300).contains(code) => {
                    match tokio::fs::write(path, body.as_bytes()).await {
                        Ok(()) => HostHttpResult::from_response(&self.host, *code, String::new()),
                        Err(e) => HostHttpResult::from_error(
                            &self.host,
                            HostError::Download {
                                path: path.display().to_string(),
                                message: e.to_string(),
                            },
                        ),
                    }
                }
                _ => HostHttpResult::from_response(&self.host, *code, body.clone()),
            },
        }
    }
}
