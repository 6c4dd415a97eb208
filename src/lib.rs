pub mod config;
pub mod coordinator;
pub mod http;
pub mod ops;
pub mod testing;

pub use config::{EngineConfig, SensitiveParams, ServiceEndpoint};
pub use coordinator::{BootstrapOptions, VCoordinationDatabase, VCoordinationNode};
pub use http::{HostHttpResult, HttpAdapterFactory, HttpRequestDispatcher, HttpsCerts};
pub use ops::{ClusterOp, OpEngine, OpEngineExecContext, OpError};
