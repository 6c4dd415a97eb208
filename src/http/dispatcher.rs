//! Request dispatcher: fan-out of a cluster request, fan-in of host results

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use slog::{info, o, Logger};

use super::adapter::AdapterFactory;
use super::errors::DispatchError;
use super::pool::AdapterPool;
use super::request::ClusterHttpRequest;

/// Sends an operation's per-host requests through the adapter pool.
pub struct HttpRequestDispatcher {
    pool: AdapterPool,
    logger: Logger,
}

impl HttpRequestDispatcher {
    pub fn new(factory: Arc<dyn AdapterFactory>, logger: &Logger) -> Self {
        let logger = logger.new(o!("component" => "HTTPRequestDispatcher"));
        Self {
            pool: AdapterPool::new(factory, logger.clone()),
            logger,
        }
    }

    /// Set up a connection for each host.
    pub fn setup(&mut self, hosts: &[String]) -> Result<(), DispatchError> {
        self.pool.setup(hosts)
    }

    /// Set up a connection for each host whose response is saved to a file.
    pub fn setup_for_download(
        &mut self,
        hosts: &[String],
        host_to_file_path: &HashMap<String, PathBuf>,
    ) -> Result<(), DispatchError> {
        self.pool.setup_for_download(hosts, host_to_file_path)
    }

    pub fn pool(&self) -> &AdapterPool {
        &self.pool
    }

    /// Blocks until every host in the request has a result.
    pub async fn send_request(
        &self,
        cluster_request: &mut ClusterHttpRequest,
    ) -> Result<(), DispatchError> {
        info!(self.logger, "HTTP request dispatcher's send_request is called";
            "op" => &cluster_request.name,
            "hosts" => cluster_request.request_collection.len()
        );
        self.pool.send_request(cluster_request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{HostHttpRequest, Method};
    use crate::testing::{create_test_logger, MockAdapterFactory, MockResponse};

    #[tokio::test]
    async fn test_result_keys_match_request_keys() {
        let hosts: Vec<String> = (1..=5).map(|i| format!("10.0.0.{}", i)).collect();
        let mut factory = MockAdapterFactory::new();
        for host in &hosts {
            factory = factory.with_response(host, MockResponse::ok(r#"{"ok":"yes"}"#));
        }
        let factory = Arc::new(factory);
        let mut dispatcher = HttpRequestDispatcher::new(factory.clone(), &create_test_logger());
        dispatcher.setup(&hosts).unwrap();

        let mut request = ClusterHttpRequest::new("Op");
        for host in &hosts {
            let mut host_request = HostHttpRequest::new(Method::Get);
            host_request.build_nma_endpoint("health");
            request.request_collection.insert(host.clone(), host_request);
        }
        dispatcher.send_request(&mut request).await.unwrap();

        let mut result_hosts: Vec<&String> = request.result_collection.keys().collect();
        result_hosts.sort();
        let mut request_hosts: Vec<&String> = request.request_collection.keys().collect();
        request_hosts.sort();
        assert_eq!(result_hosts, request_hosts);
        assert_eq!(factory.calls().len(), hosts.len());
    }

    #[tokio::test]
    async fn test_stale_results_are_replaced() {
        let factory = Arc::new(
            MockAdapterFactory::new().with_response("h1", MockResponse::ok("{}")),
        );
        let mut dispatcher = HttpRequestDispatcher::new(factory, &create_test_logger());
        dispatcher.setup(&["h1".to_string()]).unwrap();

        let mut request = ClusterHttpRequest::new("Op");
        request
            .request_collection
            .insert("h1".to_string(), HostHttpRequest::new(Method::Get));
        request.result_collection.insert(
            "old-host".to_string(),
            crate::http::HostHttpResult::from_response("old-host", 200, String::new()),
        );

        dispatcher.send_request(&mut request).await.unwrap();
        assert_eq!(request.result_collection.len(), 1);
        assert!(request.result_collection.contains_key("h1"));
    }
}
