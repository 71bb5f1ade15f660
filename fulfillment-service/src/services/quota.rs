//! Transactional quota reconciliation across independent backend
//! services.
//!
//! Each dimension is applied by a [`QuotaUpdater`] that snapshots the
//! limits it is about to overwrite. The [`QuotaTransaction`] drives the
//! updaters in a fixed order and compensates on failure by rolling the
//! applied ones back in reverse order. There is no shared transaction
//! coordinator; the rollback is best effort, not ACID.

use connector_core::backends::QuotaBackend;
use connector_core::clients::Backends;
use connector_core::error::ConnectorError;
use connector_core::models::{QuotaSpec, UNLIMITED};
use std::sync::Arc;
use tracing::{error, info, warn};

const STORAGE_CONFLICT: &str = "Current storage usage is higher than new limit.";
const COMPUTE_CONFLICT: &str = "Current CPU and RAM usage is higher than new limits.";
const NETWORK_CONFLICT: &str = "Current amount of Floating IPs is higher than new limits.";
const CONTAINER_CONFLICT: &str = "Current kubernetes cluster amount is higher than new limits.";
const LOADBALANCER_CONFLICT: &str = "Current amount of LoadBalancers is higher than new limits.";

/// The five reconciled quota dimensions, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Storage,
    Compute,
    Network,
    LoadBalancer,
    Container,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Storage => "storage",
            QuotaKind::Compute => "compute",
            QuotaKind::Network => "network",
            QuotaKind::LoadBalancer => "load-balancer",
            QuotaKind::Container => "container",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            QuotaKind::Storage => 0,
            QuotaKind::Compute => 1,
            QuotaKind::Network => 2,
            QuotaKind::LoadBalancer => 3,
            QuotaKind::Container => 4,
        }
    }
}

/// Requested limits for one dimension.
#[derive(Debug, Clone)]
pub struct DimensionRequest {
    pub kind: QuotaKind,
    pub limits: QuotaSpec,
}

/// Quota backend handles by dimension. An absent backend makes its
/// dimension a silent no-op.
#[derive(Clone, Default)]
pub struct QuotaBackends {
    pub storage: Option<Arc<dyn QuotaBackend>>,
    pub compute: Option<Arc<dyn QuotaBackend>>,
    pub network: Option<Arc<dyn QuotaBackend>>,
    pub loadbalancer: Option<Arc<dyn QuotaBackend>>,
    pub container: Option<Arc<dyn QuotaBackend>>,
}

impl QuotaBackends {
    pub fn from_backends(backends: &Backends) -> Self {
        Self {
            storage: Some(backends.storage_quota.clone()),
            compute: Some(backends.compute_quota.clone()),
            network: Some(backends.network_quota.clone()),
            loadbalancer: backends.loadbalancer_quota.clone(),
            container: backends.container_quota.clone(),
        }
    }

    fn for_kind(&self, kind: QuotaKind) -> Option<Arc<dyn QuotaBackend>> {
        match kind {
            QuotaKind::Storage => self.storage.clone(),
            QuotaKind::Compute => self.compute.clone(),
            QuotaKind::Network => self.network.clone(),
            QuotaKind::LoadBalancer => self.loadbalancer.clone(),
            QuotaKind::Container => self.container.clone(),
        }
    }
}

/// Applies one dimension's limits and remembers what it overwrote.
pub struct QuotaUpdater {
    kind: QuotaKind,
    backend: Option<Arc<dyn QuotaBackend>>,
    snapshot: Option<QuotaSpec>,
}

impl QuotaUpdater {
    pub fn new(kind: QuotaKind, backend: Option<Arc<dyn QuotaBackend>>) -> Self {
        Self {
            kind,
            backend,
            snapshot: None,
        }
    }

    pub fn kind(&self) -> QuotaKind {
        self.kind
    }

    /// Write the requested limits, stashing the previous ones for
    /// rollback. `BadQuota` means current usage exceeds a requested
    /// limit; a failed apply leaves no snapshot behind, so a later
    /// rollback is a no-op.
    pub async fn apply(
        &mut self,
        project_id: &str,
        requested: &QuotaSpec,
    ) -> Result<(), ConnectorError> {
        let Some(backend) = self.backend.clone() else {
            return Ok(());
        };

        match self.kind {
            QuotaKind::Storage => self.apply_storage(&backend, project_id, requested).await,
            QuotaKind::Compute => self.apply_compute(&backend, project_id, requested).await,
            QuotaKind::Network => {
                self.apply_guarded(&backend, project_id, requested, "floatingip", NETWORK_CONFLICT)
                    .await
            }
            QuotaKind::LoadBalancer => {
                self.apply_guarded(
                    &backend,
                    project_id,
                    requested,
                    "load_balancer",
                    LOADBALANCER_CONFLICT,
                )
                .await
            }
            QuotaKind::Container => {
                self.apply_guarded(
                    &backend,
                    project_id,
                    requested,
                    "hard_limit",
                    CONTAINER_CONFLICT,
                )
                .await
            }
        }
    }

    /// Re-apply the stashed limits. No-op when nothing was applied or
    /// the rollback already ran.
    pub async fn rollback(&mut self, project_id: &str) -> Result<(), ConnectorError> {
        let Some(previous) = self.snapshot.take() else {
            return Ok(());
        };
        self.apply(project_id, &previous).await?;
        self.snapshot = None;
        Ok(())
    }

    /// Storage limits are per volume type. The backend additionally
    /// enforces a `gigabytes` total, so every currently-limited type is
    /// zeroed first and the total is recomputed from the request, with
    /// any unlimited type making the total unlimited.
    async fn apply_storage(
        &mut self,
        backend: &Arc<dyn QuotaBackend>,
        project_id: &str,
        requested: &QuotaSpec,
    ) -> Result<(), ConnectorError> {
        let reading = backend.get(project_id).await?;
        let current = reading.limits.with_prefix("gigabytes_");

        let mut write = current.zeroed();
        let mut total: i64 = 0;
        for (key, value) in requested.iter() {
            if total == UNLIMITED || value == UNLIMITED {
                total = UNLIMITED;
            } else {
                total += value;
            }
            write.insert(key.to_string(), value);
        }
        write.insert("gigabytes", total);

        match backend.set(project_id, &write).await {
            Ok(()) => {
                self.snapshot = Some(current);
                Ok(())
            }
            Err(ConnectorError::BadRequest(_)) => {
                Err(ConnectorError::BadQuota(STORAGE_CONFLICT.to_string()))
            }
            Err(other) => Err(other),
        }
    }

    async fn apply_compute(
        &mut self,
        backend: &Arc<dyn QuotaBackend>,
        project_id: &str,
        requested: &QuotaSpec,
    ) -> Result<(), ConnectorError> {
        let reading = backend.get(project_id).await?;
        match backend.set(project_id, requested).await {
            Ok(()) => {
                self.snapshot = Some(reading.limits.with_keys(&["cores", "ram"]));
                Ok(())
            }
            Err(ConnectorError::BadRequest(_)) => {
                Err(ConnectorError::BadQuota(COMPUTE_CONFLICT.to_string()))
            }
            Err(other) => Err(other),
        }
    }

    /// Single-key dimensions whose backend does not validate usage on
    /// write: the usage check happens here, before anything is touched.
    async fn apply_guarded(
        &mut self,
        backend: &Arc<dyn QuotaBackend>,
        project_id: &str,
        requested: &QuotaSpec,
        key: &str,
        conflict: &str,
    ) -> Result<(), ConnectorError> {
        let reading = backend.get(project_id).await?;
        let limit = requested.get(key).unwrap_or(UNLIMITED);
        if limit >= 0 && reading.in_use.get(key).unwrap_or(0) > limit {
            return Err(ConnectorError::BadQuota(conflict.to_string()));
        }

        match backend.set(project_id, requested).await {
            Ok(()) => {
                self.snapshot = Some(reading.limits.with_keys(&[key]));
                Ok(())
            }
            Err(ConnectorError::BadRequest(_)) => {
                Err(ConnectorError::BadQuota(conflict.to_string()))
            }
            Err(other) => Err(other),
        }
    }
}

/// One logical quota update spanning all requested dimensions.
///
/// Dimensions are applied in [`QuotaKind`] order. `BadQuota` conflicts
/// are collected across the whole pass so the customer sees every
/// conflicting dimension at once; any other error aborts immediately.
/// Either way a failed transaction rolls back every applied dimension,
/// newest first.
pub struct QuotaTransaction<'a> {
    backends: &'a QuotaBackends,
    project_id: String,
}

impl<'a> QuotaTransaction<'a> {
    pub fn new(backends: &'a QuotaBackends, project_id: impl Into<String>) -> Self {
        Self {
            backends,
            project_id: project_id.into(),
        }
    }

    pub async fn run(&self, mut requests: Vec<DimensionRequest>) -> Result<(), ConnectorError> {
        requests.sort_by_key(|r| r.kind.rank());

        let mut applied: Vec<QuotaUpdater> = Vec::new();
        let mut conflicts: Vec<String> = Vec::new();

        for request in &requests {
            let mut updater =
                QuotaUpdater::new(request.kind, self.backends.for_kind(request.kind));
            match updater.apply(&self.project_id, &request.limits).await {
                Ok(()) => applied.push(updater),
                Err(ConnectorError::BadQuota(message)) => {
                    warn!(
                        project_id = %self.project_id,
                        dimension = request.kind.as_str(),
                        %message,
                        "Quota conflict"
                    );
                    conflicts.push(message);
                }
                Err(error) => {
                    error!(
                        project_id = %self.project_id,
                        dimension = request.kind.as_str(),
                        error = %error,
                        "Unexpected error applying quota, aborting transaction"
                    );
                    self.rollback_applied(&mut applied).await;
                    return Err(error);
                }
            }
        }

        if !conflicts.is_empty() {
            if self.rollback_applied(&mut applied).await {
                return Err(ConnectorError::RollbackFailed);
            }
            return Err(ConnectorError::Rejected(conflicts.join("\n")));
        }

        info!(
            project_id = %self.project_id,
            dimensions = requests.len(),
            "Quota transaction committed"
        );
        Ok(())
    }

    /// Roll back in reverse order of application. A failed rollback is
    /// logged and does not stop the remaining ones.
    async fn rollback_applied(&self, applied: &mut [QuotaUpdater]) -> bool {
        let mut any_failed = false;
        for updater in applied.iter_mut().rev() {
            if let Err(error) = updater.rollback(&self.project_id).await {
                any_failed = true;
                error!(
                    project_id = %self.project_id,
                    dimension = updater.kind().as_str(),
                    error = %error,
                    "Unable to roll back quotas"
                );
            }
        }
        any_failed
    }
}
