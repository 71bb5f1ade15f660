//! Block-storage quota client. Storage dimensions are the per-type
//! `gigabytes_*` keys plus the `gigabytes` total.

use crate::backends::QuotaBackend;
use crate::clients::compute::quota_body;
use crate::clients::session::IdentitySession;
use crate::clients::{parse_quota_set, send_authed};
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct StorageQuotaClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl StorageQuotaClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }
}

#[async_trait]
impl QuotaBackend for StorageQuotaClient {
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError> {
        let url = format!("{}/os-quota-sets/{project_id}", self.endpoint);
        let body = send_authed(
            &self.session,
            self.session.http().get(url).query(&[("usage", "true")]),
            "get storage quota",
        )
        .await?;
        Ok(parse_quota_set(&body["quota_set"]))
    }

    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        let url = format!("{}/os-quota-sets/{project_id}", self.endpoint);
        let payload = json!({ "quota_set": quota_body(limits) });
        send_authed(
            &self.session,
            self.session.http().put(url).json(&payload),
            "set storage quota",
        )
        .await?;
        Ok(())
    }
}
