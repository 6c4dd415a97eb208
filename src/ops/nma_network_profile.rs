use std::collections::HashMap;

use async_trait::async_trait;
use slog::{info, Logger};

use super::base::{check_missing_fields, ClusterOp, OpBase};
use super::context::{NetworkProfile, OpEngineExecContext};
use super::errors::{HostErrors, OpError};
use crate::http::{HostError, HostHttpRequest, Method};

/// Asks each host's management agent which interface serves it and records
/// the answers in `network_profiles`.
pub struct NmaNetworkProfileOp {
    base: OpBase,
}

impl NmaNetworkProfileOp {
    pub fn new(hosts: Vec<String>, logger: &Logger) -> Self {
        Self {
            base: OpBase::new("NMANetworkProfileOp", hosts, logger),
        }
    }

    fn parse_profile(&self, host: &str, content: &str) -> Result<NetworkProfile, HostError> {
        let profile: NetworkProfile = self.base.parse_and_check_response(host, content)?;
        check_missing_fields(&[
            ("name", profile.name.as_str()),
            ("address", profile.address.as_str()),
            ("subnet", profile.subnet.as_str()),
            ("netmask", profile.netmask.as_str()),
            ("broadcast", profile.broadcast.as_str()),
        ])?;
        Ok(profile)
    }
}

#[async_trait]
impl ClusterOp for NmaNetworkProfileOp {
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
            request.build_nma_endpoint("network-profiles");
            request
                .query_params
                .insert("broadcast-hint".to_string(), host.clone());
            self.base.add_request(&host, request);
        }
        Ok(())
    }

    fn process_result(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpError> {
        let mut errors = HostErrors::new(&self.base.name);
        let mut profiles = HashMap::new();

        for (host, result) in self.base.sorted_results() {
            self.base.log_response(&host, &result);

            if !result.is_passing() {
                if let Some(err) = result.err() {
                    errors.push(&host, err.clone());
                }
                continue;
            }

            match self.parse_profile(&host, result.content()) {
                Ok(profile) => {
                    profiles.insert(host, profile);
                }
                Err(err) => {
                    // an agent answering with a bad profile is not worth waiting on
                    errors.push(&host, err);
                    return errors.into_result();
                }
            }
        }

        info!(self.base.logger, "Collected network profiles"; "count" => profiles.len());
        ctx.network_profiles = profiles;

        errors.into_result()
    }
}
