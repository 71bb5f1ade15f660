//! Identity session: password authentication and service-catalog
//! endpoint discovery for the infrastructure backends.

use crate::clients::retry::{retry_http_call, RetryConfig};
use crate::config::InfraConfig;
use crate::error::ConnectorError;
use secrecy::ExposeSecret;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

/// Authenticated session against the identity service.
///
/// Constructed once per run; the token is scoped to the operator
/// project and reused by every infrastructure client.
pub struct IdentitySession {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    catalog: HashMap<String, String>,
}

impl IdentitySession {
    /// Authenticate and read the service catalog.
    pub async fn connect(
        http: reqwest::Client,
        infra: &InfraConfig,
    ) -> Result<Self, ConnectorError> {
        let endpoint = infra.identity_endpoint.trim_end_matches('/').to_string();
        let payload = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": infra.username,
                            "domain": {"name": infra.domain},
                            "password": infra.password.expose_secret(),
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": infra.project,
                        "domain": {"name": infra.domain},
                    }
                }
            }
        });

        let url = format!("{endpoint}/auth/tokens");
        let retry = RetryConfig::default();
        let (token, body) = retry_http_call(&retry, "identity_authenticate", || async {
            let response = http.post(&url).json(&payload).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ConnectorError::from_status(status, "identity authentication"));
            }
            let token = response
                .headers()
                .get("x-subject-token")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    ConnectorError::Unauthorized(
                        "identity response carried no subject token".to_string(),
                    )
                })?;
            let body: serde_json::Value = response.json().await?;
            Ok((token, body))
        })
        .await?;

        let catalog = parse_catalog(&body);
        info!(
            services = catalog.len(),
            "Authenticated against identity service"
        );

        Ok(Self {
            http,
            endpoint,
            token,
            catalog,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Identity service endpoint itself.
    pub fn identity_endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Public endpoint of a catalog service, if that service is
    /// deployed. Absence is a capability gap, not an error.
    pub fn endpoint_for(&self, service_type: &str) -> Option<String> {
        let url = self.catalog.get(service_type).cloned();
        if url.is_none() {
            debug!(service_type, "Service not present in catalog");
        }
        url
    }
}

fn parse_catalog(body: &serde_json::Value) -> HashMap<String, String> {
    let mut catalog = HashMap::new();
    let entries = body["token"]["catalog"].as_array().cloned().unwrap_or_default();
    for entry in entries {
        let Some(service_type) = entry["type"].as_str() else {
            continue;
        };
        let endpoints = entry["endpoints"].as_array().cloned().unwrap_or_default();
        let public = endpoints.iter().find(|e| e["interface"] == "public");
        if let Some(url) = public.and_then(|e| e["url"].as_str()) {
            catalog.insert(
                service_type.to_string(),
                url.trim_end_matches('/').to_string(),
            );
        }
    }
    catalog
}
