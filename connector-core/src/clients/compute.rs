//! Compute service clients: quota dimensions and server operations.

use crate::backends::{ComputeBackend, QuotaBackend, Server};
use crate::clients::session::IdentitySession;
use crate::clients::{parse_quota_set, send_authed};
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Compute quota set, carrying `cores` and `ram` among others.
pub struct ComputeQuotaClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl ComputeQuotaClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }
}

#[async_trait]
impl QuotaBackend for ComputeQuotaClient {
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError> {
        let url = format!("{}/os-quota-sets/{project_id}/detail", self.endpoint);
        let body = send_authed(&self.session, self.session.http().get(url), "get compute quota")
            .await?;
        Ok(parse_quota_set(&body["quota_set"]))
    }

    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        let url = format!("{}/os-quota-sets/{project_id}", self.endpoint);
        let payload = json!({ "quota_set": quota_body(limits) });
        send_authed(
            &self.session,
            self.session.http().put(url).json(&payload),
            "set compute quota",
        )
        .await?;
        Ok(())
    }
}

pub(crate) fn quota_body(limits: &QuotaSpec) -> Value {
    let mut body = Map::new();
    for (key, value) in limits.iter() {
        body.insert(key.to_string(), Value::from(value));
    }
    Value::Object(body)
}

/// Server listing and quiesce operations.
pub struct ComputeClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl ComputeClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }

    async fn server_action(
        &self,
        server_id: &str,
        action: Value,
        context: &str,
    ) -> Result<(), ConnectorError> {
        let url = format!("{}/servers/{server_id}/action", self.endpoint);
        send_authed(
            &self.session,
            self.session.http().post(url).json(&action),
            context,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ComputeBackend for ComputeClient {
    async fn list_servers(&self, project_id: &str) -> Result<Vec<Server>, ConnectorError> {
        let url = format!("{}/servers/detail", self.endpoint);
        let body = send_authed(
            &self.session,
            self.session
                .http()
                .get(url)
                .query(&[("all_tenants", "1"), ("project_id", project_id)]),
            "list servers",
        )
        .await?;
        let servers = body["servers"].as_array().cloned().unwrap_or_default();
        Ok(servers
            .iter()
            .map(|s| Server {
                id: s["id"].as_str().unwrap_or_default().to_string(),
                name: s["name"].as_str().unwrap_or_default().to_string(),
                status: s["status"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn stop_server(&self, server_id: &str) -> Result<(), ConnectorError> {
        self.server_action(server_id, json!({"os-stop": null}), "stop server")
            .await
    }

    async fn shelve_server(&self, server_id: &str) -> Result<(), ConnectorError> {
        self.server_action(server_id, json!({"shelve": null}), "shelve server")
            .await
    }

    async fn set_server_description(
        &self,
        server_id: &str,
        description: &str,
    ) -> Result<(), ConnectorError> {
        let url = format!("{}/servers/{server_id}", self.endpoint);
        let payload = json!({ "server": {"description": description} });
        send_authed(
            &self.session,
            self.session.http().put(url).json(&payload),
            "set server description",
        )
        .await?;
        Ok(())
    }
}
