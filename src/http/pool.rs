//! Adapter pool: one adapter per host, scoped to one engine instance

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use slog::{debug, Logger};

use super::adapter::{Adapter, AdapterFactory};
use super::errors::DispatchError;
use super::request::ClusterHttpRequest;

/// Owns the per-host adapters used by a dispatcher.
///
/// A host never has more than one adapter, and a dispatch sends exactly one
/// request per host, so an adapter is never used by two in-flight requests.
pub struct AdapterPool {
    connections: HashMap<String, Box<dyn Adapter>>,
    factory: Arc<dyn AdapterFactory>,
    logger: Logger,
}

impl AdapterPool {
    pub fn new(factory: Arc<dyn AdapterFactory>, logger: Logger) -> Self {
        Self {
            connections: HashMap::new(),
            factory,
            logger,
        }
    }

    /// Prepare plain adapters for `hosts`.
    ///
    /// Plain adapters already in the pool for one of `hosts` are kept so
    /// their connections are reused; everything else is dropped.
    pub fn setup(&mut self, hosts: &[String]) -> Result<(), DispatchError> {
        let wanted: HashSet<&str> = hosts.iter().map(String::as_str).collect();
        self.connections
            .retain(|host, adapter| wanted.contains(host.as_str()) && !adapter.is_download());

        for host in hosts {
            if !self.connections.contains_key(host) {
                let adapter = self.factory.make_adapter(host)?;
                self.connections.insert(host.clone(), adapter);
            }
        }

        debug!(self.logger, "Adapter pool ready"; "hosts" => self.connections.len());
        Ok(())
    }

    /// Prepare download adapters for `hosts`, one destination file per host.
    pub fn setup_for_download(
        &mut self,
        hosts: &[String],
        host_to_file_path: &HashMap<String, PathBuf>,
    ) -> Result<(), DispatchError> {
        let mut connections = HashMap::with_capacity(hosts.len());
        for host in hosts {
            let path = host_to_file_path
                .get(host)
                .ok_or_else(|| DispatchError::MissingDownloadPath(host.clone()))?;
            connections.insert(host.clone(), self.factory.make_download_adapter(host, path)?);
        }
        self.connections = connections;

        debug!(self.logger, "Adapter pool ready for download"; "hosts" => self.connections.len());
        Ok(())
    }

    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.connections.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send every host's request concurrently and wait for all of them.
    ///
    /// Fills `result_collection` with exactly one result per requested host.
    /// Only problems with the dispatch as a whole are returned as errors.
    pub async fn send_request(
        &self,
        cluster_request: &mut ClusterHttpRequest,
    ) -> Result<(), DispatchError> {
        if cluster_request.request_collection.is_empty() {
            return Err(DispatchError::EmptyRequest(cluster_request.name.clone()));
        }

        // resolve every adapter before anything goes on the wire
        let mut in_flight = Vec::with_capacity(cluster_request.request_collection.len());
        for (host, request) in &cluster_request.request_collection {
            let adapter = self
                .connections
                .get(host)
                .ok_or_else(|| DispatchError::MissingAdapter(host.clone()))?;
            in_flight.push(async move { (host.clone(), adapter.send_request(request).await) });
        }

        let results = join_all(in_flight).await;

        cluster_request.result_collection.clear();
        for (host, result) in results {
            cluster_request.result_collection.insert(host, result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{HostHttpRequest, Method};
    use crate::testing::{create_test_logger, MockAdapterFactory, MockResponse};

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_setup_reuses_plain_adapters() {
        let factory = Arc::new(MockAdapterFactory::new());
        let mut pool = AdapterPool::new(factory.clone(), create_test_logger());

        pool.setup(&hosts(&["h1", "h2"])).unwrap();
        assert_eq!(factory.adapters_created(), 2);

        // h1 is kept, h2 dropped, h3 created
        pool.setup(&hosts(&["h1", "h3"])).unwrap();
        assert_eq!(factory.adapters_created(), 3);
        assert_eq!(pool.hosts(), hosts(&["h1", "h3"]));
    }

    #[test]
    fn test_setup_for_download_requires_paths() {
        let factory = Arc::new(MockAdapterFactory::new());
        let mut pool = AdapterPool::new(factory, create_test_logger());

        let mut paths = HashMap::new();
        paths.insert("h1".to_string(), PathBuf::from("/tmp/h1.tgz"));

        let err = pool
            .setup_for_download(&hosts(&["h1", "h2"]), &paths)
            .unwrap_err();
        assert_eq!(err, DispatchError::MissingDownloadPath("h2".to_string()));
    }

    #[test]
    fn test_plain_setup_replaces_download_adapters() {
        let factory = Arc::new(MockAdapterFactory::new());
        let mut pool = AdapterPool::new(factory.clone(), create_test_logger());

        let mut paths = HashMap::new();
        paths.insert("h1".to_string(), PathBuf::from("/tmp/h1.tgz"));
        pool.setup_for_download(&hosts(&["h1"]), &paths).unwrap();
        assert_eq!(factory.adapters_created(), 1);

        pool.setup(&hosts(&["h1"])).unwrap();
        assert_eq!(factory.adapters_created(), 2);
    }

    #[tokio::test]
    async fn test_send_request_empty_collection() {
        let factory = Arc::new(MockAdapterFactory::new());
        let pool = AdapterPool::new(factory, create_test_logger());

        let mut request = ClusterHttpRequest::new("EmptyOp");
        let err = pool.send_request(&mut request).await.unwrap_err();
        assert_eq!(err, DispatchError::EmptyRequest("EmptyOp".to_string()));
    }

    #[tokio::test]
    async fn test_send_request_missing_adapter_sends_nothing() {
        let factory = Arc::new(MockAdapterFactory::new());
        let mut pool = AdapterPool::new(factory.clone(), create_test_logger());
        pool.setup(&hosts(&["h1"])).unwrap();

        let mut request = ClusterHttpRequest::new("Op");
        for host in ["h1", "h2"] {
            request
                .request_collection
                .insert(host.to_string(), HostHttpRequest::new(Method::Get));
        }

        let err = pool.send_request(&mut request).await.unwrap_err();
        assert_eq!(err, DispatchError::MissingAdapter("h2".to_string()));
        assert!(factory.calls().is_empty());
        assert!(request.result_collection.is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_one_host_is_isolated() {
        let factory = Arc::new(
            MockAdapterFactory::new()
                .with_response("h1", MockResponse::Timeout)
                .with_response("h2", MockResponse::status(500, "boom"))
                .with_response("h3", MockResponse::ok("{}")),
        );
        let mut pool = AdapterPool::new(factory, create_test_logger());
        let all = hosts(&["h1", "h2", "h3"]);
        pool.setup(&all).unwrap();

        let mut request = ClusterHttpRequest::new("Op");
        for host in &all {
            request
                .request_collection
                .insert(host.clone(), HostHttpRequest::new(Method::Get));
        }
        pool.send_request(&mut request).await.unwrap();

        let results = &request.result_collection;
        assert_eq!(results.len(), 3);
        assert!(results["h1"].is_timeout());
        assert_eq!(results["h1"].host(), "h1");
        assert!(results["h2"].is_internal_error());
        assert!(!results["h2"].is_timeout());
        assert!(results["h3"].is_passing());
        assert_eq!(results["h3"].content(), "{}");
    }
}
