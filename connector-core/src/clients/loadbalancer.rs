//! Load-balancer service quota client (`load_balancer` dimension).
//!
//! The quota endpoint reports limits only, so current usage is derived
//! by counting the project's load balancers.

use crate::backends::QuotaBackend;
use crate::clients::compute::quota_body;
use crate::clients::session::IdentitySession;
use crate::clients::{parse_quota_set, send_authed};
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct LoadBalancerQuotaClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl LoadBalancerQuotaClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }

    async fn count_load_balancers(&self, project_id: &str) -> Result<i64, ConnectorError> {
        let url = format!("{}/v2/lbaas/loadbalancers", self.endpoint);
        let body = send_authed(
            &self.session,
            self.session.http().get(url).query(&[("project_id", project_id)]),
            "list load balancers",
        )
        .await?;
        Ok(body["loadbalancers"]
            .as_array()
            .map(|l| l.len() as i64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl QuotaBackend for LoadBalancerQuotaClient {
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError> {
        let url = format!("{}/v2/lbaas/quotas/{project_id}", self.endpoint);
        let body = send_authed(
            &self.session,
            self.session.http().get(url),
            "get load balancer quota",
        )
        .await?;
        let mut reading = parse_quota_set(&body["quota"]);
        let used = self.count_load_balancers(project_id).await?;
        reading.in_use.insert("load_balancer", used);
        Ok(reading)
    }

    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        let url = format!("{}/v2/lbaas/quotas/{project_id}", self.endpoint);
        let payload = json!({ "quota": quota_body(limits) });
        send_authed(
            &self.session,
            self.session.http().put(url).json(&payload),
            "set load balancer quota",
        )
        .await?;
        Ok(())
    }
}
