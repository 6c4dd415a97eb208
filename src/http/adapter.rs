//! Per-host adapters
//!
//! An adapter owns everything needed to talk to one host: the host address,
//! a reusable HTTP client, and for downloads the local file the response body
//! is streamed into.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use slog::{debug, o, warn, Logger};
use tokio::io::AsyncWriteExt;

use super::errors::{DispatchError, HostError};
use super::request::{HostHttpRequest, HttpsCerts, Service};
use super::result::HostHttpResult;
use crate::config::EngineConfig;

/// Sends one request to one host.
///
/// Adapters never fail: every outcome, including transport errors, is
/// reported through the returned [`HostHttpResult`].
#[async_trait]
pub trait Adapter: Send + Sync {
    fn host(&self) -> &str;

    /// Whether the response body goes to a file instead of the result
    fn is_download(&self) -> bool {
        false
    }

    async fn send_request(&self, request: &HostHttpRequest) -> HostHttpResult;
}

/// Builds adapters for the pool.
///
/// The pool only knows this trait, so tests can swap real HTTP for canned
/// responses.
pub trait AdapterFactory: Send + Sync {
    fn make_adapter(&self, host: &str) -> Result<Box<dyn Adapter>, DispatchError>;

    fn make_download_adapter(
        &self,
        host: &str,
        file_path: &Path,
    ) -> Result<Box<dyn Adapter>, DispatchError>;
}

/// reqwest-backed adapter
pub struct HttpAdapter {
    host: String,
    config: Arc<EngineConfig>,
    client: reqwest::Client,
    /// Client carrying the TLS material of the last cert-bearing request
    tls_client: Mutex<Option<(HttpsCerts, reqwest::Client)>>,
    file_path: Option<PathBuf>,
    logger: Logger,
}

impl HttpAdapter {
    pub fn new(
        host: &str,
        config: Arc<EngineConfig>,
        logger: Logger,
    ) -> Result<Self, DispatchError> {
        let client = build_client(None).map_err(|e| DispatchError::Client {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            host: host.to_string(),
            config,
            client,
            tls_client: Mutex::new(None),
            file_path: None,
            logger: logger.new(o!("host" => host.to_string())),
        })
    }

    /// Adapter that streams successful response bodies into `file_path`
    pub fn for_download(
        host: &str,
        file_path: &Path,
        config: Arc<EngineConfig>,
        logger: Logger,
    ) -> Result<Self, DispatchError> {
        let mut adapter = Self::new(host, config, logger)?;
        adapter.file_path = Some(file_path.to_path_buf());
        Ok(adapter)
    }

    fn url(&self, request: &HostHttpRequest) -> String {
        let endpoint = match request.service {
            Service::Nma => &self.config.nma,
            Service::Https => &self.config.https,
        };
        format!("{}/{}", endpoint.base_url(&self.host), request.endpoint)
    }

    fn timeout(&self, request: &HostHttpRequest) -> Duration {
        request.timeout.unwrap_or(self.config.request_timeout)
    }

    /// Client for `request`. Cert-bearing requests share one client per
    /// distinct set of TLS material, so their connections are pooled too.
    fn client_for(&self, request: &HostHttpRequest) -> Result<reqwest::Client, reqwest::Error> {
        if !request.use_certs_in_options {
            return Ok(self.client.clone());
        }

        let mut cached = self.tls_client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((certs, client)) = cached.as_ref() {
            if *certs == request.certs {
                return Ok(client.clone());
            }
        }

        let client = build_client(Some(&request.certs))?;
        *cached = Some((request.certs.clone(), client.clone()));
        Ok(client)
    }

    /// Streams the body into `path`. A partial file is removed on failure.
    async fn write_to_file(
        &self,
        path: &Path,
        response: reqwest::Response,
    ) -> Result<u64, HostError> {
        let result = stream_to_file(path, response).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(self.logger, "Failed to remove partial download";
                        "path" => %path.display(), "error" => %e);
                }
            }
        }
        result
    }
}

async fn stream_to_file(path: &Path, mut response: reqwest::Response) -> Result<u64, HostError> {
    let download_err = |e: std::io::Error| HostError::Download {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut file = tokio::fs::File::create(path).await.map_err(download_err)?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(download_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(download_err)?;
    Ok(written)
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_download(&self) -> bool {
        self.file_path.is_some()
    }

    async fn send_request(&self, request: &HostHttpRequest) -> HostHttpResult {
        let client = match self.client_for(request) {
            Ok(client) => client,
            Err(e) => {
                warn!(self.logger, "Failed to load TLS material"; "error" => %e);
                return HostHttpResult::from_error(&self.host, HostError::from(e));
            }
        };

        let url = self.url(request);
        debug!(self.logger, "Sending HTTP request";
            "method" => request.method.as_str(),
            "url" => &url
        );

        let mut builder = client
            .request(request.method.into(), &url)
            .timeout(self.timeout(request));
        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_ref());
        }
        if !request.request_data.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(request.request_data.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(self.logger, "HTTP request failed"; "error" => %e, "url" => &url);
                return HostHttpResult::from_error(&self.host, HostError::from(e));
            }
        };

        let status_code = response.status().as_u16();
        if let (Some(path), true) = (&self.file_path, response.status().is_success()) {
            return match self.write_to_file(path, response).await {
                Ok(bytes) => {
                    debug!(self.logger, "Download complete";
                        "path" => %path.display(),
                        "bytes" => bytes
                    );
                    HostHttpResult::from_response(&self.host, status_code, String::new())
                }
                Err(e) => {
                    warn!(self.logger, "Download failed"; "error" => %e);
                    HostHttpResult::from_error(&self.host, e)
                }
            };
        }

        match response.text().await {
            Ok(content) => HostHttpResult::from_response(&self.host, status_code, content),
            Err(e) => HostHttpResult::from_error(&self.host, HostError::from(e)),
        }
    }
}

/// Both per-node services present self-signed certificates unless a CA is
/// supplied, so verification only happens against an explicit CA.
fn build_client(certs: Option<&HttpsCerts>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();

    match certs {
        Some(certs) if !certs.ca_cert.is_empty() => {
            let ca = reqwest::Certificate::from_pem(certs.ca_cert.as_bytes())?;
            builder = builder.add_root_certificate(ca);
        }
        _ => {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    if let Some(certs) = certs.filter(|c| c.has_identity()) {
        let pem = format!("{}\n{}", certs.cert, certs.key);
        builder = builder.identity(reqwest::Identity::from_pem(pem.as_bytes())?);
    }

    builder.build()
}

/// Factory producing [`HttpAdapter`]s
pub struct HttpAdapterFactory {
    config: Arc<EngineConfig>,
    logger: Logger,
}

impl HttpAdapterFactory {
    pub fn new(config: Arc<EngineConfig>, logger: Logger) -> Self {
        Self { config, logger }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn make_adapter(&self, host: &str) -> Result<Box<dyn Adapter>, DispatchError> {
        Ok(Box::new(HttpAdapter::new(
            host,
            self.config.clone(),
            self.logger.clone(),
        )?))
    }

    fn make_download_adapter(
        &self,
        host: &str,
        file_path: &Path,
    ) -> Result<Box<dyn Adapter>, DispatchError> {
        Ok(Box::new(HttpAdapter::for_download(
            host,
            file_path,
            self.config.clone(),
            self.logger.clone(),
        )?))
    }
}
