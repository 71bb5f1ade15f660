//! Container-infrastructure quota client (`hard_limit` dimension, one
//! `Cluster` resource per project).

use crate::backends::QuotaBackend;
use crate::clients::session::IdentitySession;
use crate::clients::send_authed;
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec, UNLIMITED};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ContainerQuotaClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl ContainerQuotaClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }

    /// The backend has no per-quota usage field; count the project's
    /// clusters instead.
    async fn count_clusters(&self, project_id: &str) -> Result<i64, ConnectorError> {
        let url = format!("{}/v1/clusters", self.endpoint);
        let body = send_authed(
            &self.session,
            self.session.http().get(url).query(&[("all_tenants", "true")]),
            "list clusters",
        )
        .await?;
        let clusters = body["clusters"].as_array().cloned().unwrap_or_default();
        Ok(clusters
            .iter()
            .filter(|c| c["project_id"].as_str() == Some(project_id))
            .count() as i64)
    }

    async fn fetch_quota(&self, project_id: &str) -> Result<Option<Value>, ConnectorError> {
        let url = format!("{}/v1/quotas/{project_id}/Cluster", self.endpoint);
        match send_authed(&self.session, self.session.http().get(url), "get container quota")
            .await
        {
            Ok(body) => Ok(Some(body)),
            Err(ConnectorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl QuotaBackend for ContainerQuotaClient {
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError> {
        // No stored quota means the deployment default applies; report
        // it as unlimited so reconciliation still has a value to snapshot.
        let limit = match self.fetch_quota(project_id).await? {
            Some(body) => body["hard_limit"].as_i64().unwrap_or(UNLIMITED),
            None => UNLIMITED,
        };
        let used = self.count_clusters(project_id).await?;
        Ok(QuotaReading {
            limits: QuotaSpec::new().with("hard_limit", limit),
            in_use: QuotaSpec::new().with("hard_limit", used),
        })
    }

    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        let Some(hard_limit) = limits.get("hard_limit") else {
            return Ok(());
        };
        if self.fetch_quota(project_id).await?.is_some() {
            let url = format!("{}/v1/quotas/{project_id}/Cluster", self.endpoint);
            let payload = json!({"hard_limit": hard_limit});
            send_authed(
                &self.session,
                self.session.http().patch(url).json(&payload),
                "update container quota",
            )
            .await?;
        } else {
            let url = format!("{}/v1/quotas", self.endpoint);
            let payload = json!({
                "project_id": project_id,
                "resource": "Cluster",
                "hard_limit": hard_limit,
            });
            send_authed(
                &self.session,
                self.session.http().post(url).json(&payload),
                "create container quota",
            )
            .await?;
        }
        Ok(())
    }
}
