//! HTTP layer
//!
//! This module provides everything needed to talk to the two per-node REST
//! services (node management agent and the embedded HTTPS service):
//! - Request and result model for one cluster-wide dispatch
//! - Per-host adapters backed by reqwest, including file downloads
//! - The adapter pool and the dispatcher that fans requests out concurrently

pub mod adapter;
pub mod dispatcher;
pub mod errors;
pub mod pool;
pub mod request;
pub mod result;

pub use adapter::{Adapter, AdapterFactory, HttpAdapter, HttpAdapterFactory};
pub use dispatcher::HttpRequestDispatcher;
pub use errors::{DispatchError, HostError};
pub use pool::AdapterPool;
pub use request::{ClusterHttpRequest, HostHttpRequest, HttpsCerts, Method, Service};
pub use result::{HostHttpResult, ResultStatus};
