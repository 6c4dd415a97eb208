use async_trait::async_trait;
use serde::Deserialize;
use slog::{info, Logger};

use super::base::{ClusterOp, OpBase, OpHttpsBase};
use super::context::OpEngineExecContext;
use super::errors::{HostErrors, OpError};
use crate::http::{HostError, HostHttpRequest, Method};

#[derive(Debug, Clone, Deserialize)]
pub struct SubclusterInfo {
    #[serde(rename = "subcluster_name")]
    pub sc_name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubclusterListResponse {
    #[serde(rename = "subcluster_list")]
    pub sc_info_list: Vec<SubclusterInfo>,
}

/// Looks up a subcluster by name through the HTTPS service and records the
/// default subcluster in the execution context.
///
/// Every host describes the same database, so the first host that answers
/// with a readable list decides the outcome.
pub struct HttpsFindSubclusterOp {
    base: OpBase,
    https: OpHttpsBase,
    sc_name: String,
    ignore_not_found: bool,
}

impl HttpsFindSubclusterOp {
    /// With `ignore_not_found` a missing `sc_name` is not an error; the
    /// default subcluster must exist either way.
    pub fn new(
        hosts: Vec<String>,
        use_http_password: bool,
        user_name: &str,
        https_password: Option<&str>,
        sc_name: &str,
        ignore_not_found: bool,
        logger: &Logger,
    ) -> Result<Self, OpError> {
        let base = OpBase::new("HTTPSFindSubclusterOp", hosts, logger);
        let mut https = OpHttpsBase::default();
        https.validate_and_set_username_and_password(
            &base.name,
            use_http_password,
            user_name,
            https_password,
        )?;

        Ok(Self {
            base,
            https,
            sc_name: sc_name.to_string(),
            ignore_not_found,
        })
    }

    /// Check one host's list; `Err` carries the reason the lookup failed
    fn check_subclusters(
        &self,
        resp: &SubclusterListResponse,
        ctx: &mut OpEngineExecContext,
    ) -> Result<(), HostError> {
        let mut found_named = false;
        let mut found_default = false;

        for sc in &resp.sc_info_list {
            if sc.sc_name == self.sc_name {
                found_named = true;
                info!(self.base.logger, "Subcluster exists in the database"; "subcluster" => &sc.sc_name);
            }
            if sc.is_default {
                found_default = true;
                ctx.default_sc_name = Some(sc.sc_name.clone());
                info!(self.base.logger, "Found default subcluster in the database"; "subcluster" => &sc.sc_name);
            }
            if found_named && found_default {
                break;
            }
        }

        if !self.sc_name.is_empty() && !self.ignore_not_found && !found_named {
            return Err(HostError::Response(format!(
                "subcluster '{}' does not exist in the database",
                self.sc_name
            )));
        }

        if !found_default {
            return Err(HostError::Response(
                "cannot find a default subcluster in the database".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl ClusterOp for HttpsFindSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        ctx.dispatcher
            .setup(&self.base.hosts)
            .map_err(|source| OpError::Dispatch {
                op: self.base.name.clone(),
                source,
            })?;

        for host in self.base.hosts.clone() {
            let mut request = HostHttpRequest::new(Method::Get);
            request.build_https_endpoint("subclusters");
            self.https.apply_auth(&mut request);
            self.base.add_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let mut errors = HostErrors::new(&self.base.name);

        for (host, result) in self.base.sorted_results() {
            self.base.log_response(&host, &result);

            if result.is_unauthorized_request() {
                // every other host would reject the same credentials
                let error = result
                    .err()
                    .cloned()
                    .unwrap_or_else(|| HostError::Response("unauthorized".to_string()));
                return Err(OpError::Unauthorized {
                    op: self.base.name.clone(),
                    host,
                    error,
                });
            }

            if !result.is_passing() {
                if let Some(err) = result.err() {
                    errors.push(&host, err.clone());
                }
                continue;
            }

            let resp: SubclusterListResponse =
                match self.base.parse_and_check_response(&host, result.content()) {
                    Ok(resp) => resp,
                    Err(err) => {
                        errors.push(&host, err);
                        return errors.into_result();
                    }
                };

            if let Err(err) = self.check_subclusters(&resp, ctx) {
                errors.push(&host, err);
                return errors.into_result();
            }
            return Ok(());
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::ops::OpEngine;
    use crate::testing::{create_test_logger, MockAdapterFactory, MockResponse};

    const SC_LIST: &str = r#"{"subcluster_list":[
        {"subcluster_name":"default_subcluster","control_set_size":-1,"is_secondary":false,"is_default":true,"sandbox":""},
        {"subcluster_name":"sc1","control_set_size":2,"is_secondary":true,"is_default":false,"sandbox":""}
    ]}"#;

    fn hosts() -> Vec<String> {
        vec!["10.0.0.1".into(), "10.0.0.2".into(), "10.0.0.3".into()]
    }

    async fn run(
        factory: Arc<MockAdapterFactory>,
        sc_name: &str,
        ignore_not_found: bool,
    ) -> (Result<(), OpError>, OpEngineExecContext) {
        let logger = create_test_logger();
        let mut ctx = OpEngineExecContext::new(Arc::new(EngineConfig::default()), factory, &logger);
        let op = HttpsFindSubclusterOp::new(
            hosts(),
            true,
            "dbadmin",
            Some("pw"),
            sc_name,
            ignore_not_found,
            &logger,
        )
        .unwrap();
        let mut engine = OpEngine::new(vec![Box::new(op) as Box<dyn ClusterOp>], hosts(), &logger);
        let result = engine.run(&mut ctx).await;
        (result, ctx)
    }

    #[tokio::test]
    async fn test_find_existing_subcluster() {
        let factory = Arc::new(MockAdapterFactory::new().with_default_response(MockResponse::ok(SC_LIST)));
        let (result, ctx) = run(factory.clone(), "sc1", false).await;

        result.unwrap();
        assert_eq!(ctx.default_sc_name.as_deref(), Some("default_subcluster"));

        let calls = factory.calls();
        assert_eq!(calls.len(), 3);
        for call in calls {
            assert_eq!(call.endpoint, "v1/subclusters");
            assert_eq!(call.username.as_deref(), Some("dbadmin"));
            assert_eq!(call.password.as_deref(), Some("pw"));
        }
    }

    #[tokio::test]
    async fn test_missing_subcluster_fails() {
        let factory = Arc::new(MockAdapterFactory::new().with_default_response(MockResponse::ok(SC_LIST)));
        let (result, _) = run(factory, "sc2", false).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("subcluster 'sc2' does not exist"));
        // decided by the first host
        assert_eq!(err.failed_hosts(), vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_missing_subcluster_ignored() {
        let factory = Arc::new(MockAdapterFactory::new().with_default_response(MockResponse::ok(SC_LIST)));
        let (result, ctx) = run(factory, "sc2", true).await;

        result.unwrap();
        assert_eq!(ctx.default_sc_name.as_deref(), Some("default_subcluster"));
    }

    #[tokio::test]
    async fn test_no_default_subcluster() {
        let factory = Arc::new(MockAdapterFactory::new().with_default_response(MockResponse::ok(
            r#"{"subcluster_list":[{"subcluster_name":"sc1","is_default":false}]}"#,
        )));
        let (result, ctx) = run(factory, "sc1", false).await;

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot find a default subcluster"));
        assert!(ctx.default_sc_name.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_short_circuits() {
        let factory = Arc::new(
            MockAdapterFactory::new()
                .with_default_response(MockResponse::ok(SC_LIST))
                .with_response("10.0.0.1", MockResponse::status(401, "Wrong password")),
        );
        let (result, ctx) = run(factory, "sc1", false).await;

        match result {
            Err(OpError::Unauthorized { host, error, .. }) => {
                assert_eq!(host, "10.0.0.1");
                assert!(matches!(error, HostError::HttpStatus { code: 401, .. }));
            }
            other => panic!("Expected unauthorized, got {:?}", other),
        }
        assert!(ctx.default_sc_name.is_none());
    }

    #[tokio::test]
    async fn test_failed_host_skipped_for_next() {
        let factory = Arc::new(
            MockAdapterFactory::new()
                .with_default_response(MockResponse::ok(SC_LIST))
                .with_response("10.0.0.1", MockResponse::Timeout),
        );
        let (result, ctx) = run(factory, "sc1", false).await;

        result.unwrap();
        assert_eq!(ctx.default_sc_name.as_deref(), Some("default_subcluster"));
    }

    #[tokio::test]
    async fn test_every_host_down() {
        let factory = Arc::new(MockAdapterFactory::new().with_default_response(MockResponse::Refused));
        let (result, _) = run(factory, "sc1", false).await;

        let err = result.unwrap_err();
        assert_eq!(err.failed_hosts(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_malformed_list_stops() {
        let factory = Arc::new(
            MockAdapterFactory::new()
                .with_default_response(MockResponse::ok(SC_LIST))
                .with_response("10.0.0.1", MockResponse::ok("<html>")),
        );
        let (result, _) = run(factory, "sc1", false).await;

        match result {
            Err(OpError::Hosts(errors)) => {
                assert!(matches!(errors.error_for("10.0.0.1"), Some(HostError::Parse(_))));
            }
            other => panic!("Expected host errors, got {:?}", other),
        }
    }

    #[test]
    fn test_password_auth_requires_user() {
        let result = HttpsFindSubclusterOp::new(
            hosts(),
            true,
            "",
            None,
            "sc1",
            false,
            &create_test_logger(),
        );
        assert!(matches!(result, Err(OpError::Config { .. })));
    }
}
