//! Network service quota client (`floatingip` dimension).

use crate::backends::QuotaBackend;
use crate::clients::compute::quota_body;
use crate::clients::session::IdentitySession;
use crate::clients::{parse_quota_set, send_authed};
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct NetworkQuotaClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl NetworkQuotaClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }
}

#[async_trait]
impl QuotaBackend for NetworkQuotaClient {
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError> {
        let url = format!("{}/v2.0/quotas/{project_id}/details.json", self.endpoint);
        let body =
            send_authed(&self.session, self.session.http().get(url), "get network quota").await?;
        Ok(parse_quota_set(&body["quota"]))
    }

    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        let url = format!("{}/v2.0/quotas/{project_id}", self.endpoint);
        let payload = json!({ "quota": quota_body(limits) });
        send_authed(
            &self.session,
            self.session.http().put(url).json(&payload),
            "set network quota",
        )
        .await?;
        Ok(())
    }
}
