//! Concrete HTTP clients behind the capability traits, plus the
//! [`Backends`] bundle handed to the services.

pub mod blockstorage;
pub mod commerce;
pub mod compute;
pub mod container;
pub mod identity;
pub mod loadbalancer;
pub mod metering;
pub mod network;
pub mod retry;
pub mod session;

use crate::backends::{
    CommercePlatform, ComputeBackend, IdentityBackend, MeteringBackend, QuotaBackend,
};
use crate::config::Config;
use crate::error::ConnectorError;
use crate::models::{QuotaReading, QuotaSpec};
use serde_json::Value;
use session::IdentitySession;
use std::sync::Arc;
use tracing::warn;

/// All external collaborators, resolved once per run.
///
/// Services missing from the deployment catalog are `None`; the quota
/// transaction treats an absent backend as a no-op dimension.
pub struct Backends {
    pub identity: Arc<dyn IdentityBackend>,
    pub compute: Arc<dyn ComputeBackend>,
    pub compute_quota: Arc<dyn QuotaBackend>,
    pub storage_quota: Arc<dyn QuotaBackend>,
    pub network_quota: Arc<dyn QuotaBackend>,
    pub loadbalancer_quota: Option<Arc<dyn QuotaBackend>>,
    pub container_quota: Option<Arc<dyn QuotaBackend>>,
    pub metering: Option<Arc<dyn MeteringBackend>>,
    pub commerce: Arc<dyn CommercePlatform>,
}

impl Backends {
    /// Authenticate against the identity service and wire up every
    /// client the catalog advertises.
    pub async fn build(config: &Config) -> Result<Self, ConnectorError> {
        let http = reqwest::Client::new();
        let session = Arc::new(IdentitySession::connect(http.clone(), &config.infra).await?);

        let compute_endpoint = required_endpoint(&session, "compute")?;
        let storage_endpoint = required_endpoint(&session, "volumev3")?;
        let network_endpoint = required_endpoint(&session, "network")?;

        let loadbalancer_quota = optional_quota_backend(
            session.endpoint_for("load-balancer"),
            "load-balancer",
            |endpoint| {
                Arc::new(loadbalancer::LoadBalancerQuotaClient::new(
                    session.clone(),
                    endpoint,
                )) as Arc<dyn QuotaBackend>
            },
        );
        let container_quota = optional_quota_backend(
            session.endpoint_for("container-infra"),
            "container-infra",
            |endpoint| {
                Arc::new(container::ContainerQuotaClient::new(session.clone(), endpoint))
                    as Arc<dyn QuotaBackend>
            },
        );

        let metering = match session.endpoint_for("metric") {
            Some(endpoint) => Some(Arc::new(metering::MeteringClient::new(
                session.clone(),
                endpoint,
            )) as Arc<dyn MeteringBackend>),
            None => {
                warn!("Metering service not deployed, consumption collection unavailable");
                None
            }
        };

        Ok(Self {
            identity: Arc::new(identity::IdentityClient::new(session.clone())),
            compute: Arc::new(compute::ComputeClient::new(
                session.clone(),
                compute_endpoint.clone(),
            )),
            compute_quota: Arc::new(compute::ComputeQuotaClient::new(
                session.clone(),
                compute_endpoint,
            )),
            storage_quota: Arc::new(blockstorage::StorageQuotaClient::new(
                session.clone(),
                storage_endpoint,
            )),
            network_quota: Arc::new(network::NetworkQuotaClient::new(
                session.clone(),
                network_endpoint,
            )),
            loadbalancer_quota,
            container_quota,
            metering,
            commerce: Arc::new(commerce::CommerceClient::new(http, &config.marketplace)),
        })
    }
}

fn required_endpoint(
    session: &IdentitySession,
    service_type: &str,
) -> Result<String, ConnectorError> {
    session.endpoint_for(service_type).ok_or_else(|| {
        ConnectorError::Unavailable(format!("service \"{service_type}\" not in catalog"))
    })
}

fn optional_quota_backend(
    endpoint: Option<String>,
    service_type: &str,
    make: impl FnOnce(String) -> Arc<dyn QuotaBackend>,
) -> Option<Arc<dyn QuotaBackend>> {
    match endpoint {
        Some(endpoint) => Some(make(endpoint)),
        None => {
            warn!(service_type, "Quota service not deployed, dimension skipped");
            None
        }
    }
}

/// Issue a token-authenticated request and map failures into the shared
/// taxonomy. Bodies of 204 responses come back as `Null`.
pub(crate) async fn send_authed(
    session: &IdentitySession,
    request: reqwest::RequestBuilder,
    context: &str,
) -> Result<Value, ConnectorError> {
    let response = request
        .header("X-Auth-Token", session.token())
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ConnectorError::from_status(status, context));
    }
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    Ok(response.json().await.unwrap_or(Value::Null))
}

/// Parse a backend quota-set object into limits and usage.
///
/// Backends disagree on shape: some report plain integers per key, some
/// report `{"limit": n, "in_use": n}` objects, some call usage `used`.
pub(crate) fn parse_quota_set(entries: &Value) -> QuotaReading {
    let mut limits = QuotaSpec::new();
    let mut in_use = QuotaSpec::new();
    let Some(object) = entries.as_object() else {
        return QuotaReading::default();
    };
    for (key, value) in object {
        if let Some(limit) = value.as_i64() {
            limits.insert(key.clone(), limit);
            continue;
        }
        if let Some(detail) = value.as_object() {
            if let Some(limit) = detail.get("limit").and_then(Value::as_i64) {
                limits.insert(key.clone(), limit);
            }
            if let Some(used) = detail
                .get("in_use")
                .or_else(|| detail.get("used"))
                .and_then(Value::as_i64)
            {
                in_use.insert(key.clone(), used);
            }
        }
    }
    QuotaReading { limits, in_use }
}
