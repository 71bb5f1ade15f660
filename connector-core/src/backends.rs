//! Capability traits for every external collaborator.
//!
//! The core state machines depend only on these contracts; the concrete
//! HTTP clients live in [`crate::clients`]. A backend service that is
//! not deployed is represented as an absent client, never as an error.

use crate::error::ConnectorError;
use crate::models::{
    ActivationAnswer, Asset, AssetStatus, Domain, FulfillmentRequest, NewProject, NewUser, Param,
    Project, ProjectUpdate, QuotaReading, QuotaSpec, Role, UsageFileDraft, UsageFileInfo,
    UsageRecord, UsageWindow, User, UserUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Identity provider: domains, projects, users, role bindings.
/// Project metadata doubles as the durable usage-report store.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ConnectorError>;
    async fn list_domains(&self, name: Option<&str>) -> Result<Vec<Domain>, ConnectorError>;
    async fn create_domain(
        &self,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError>;
    async fn update_domain(
        &self,
        domain_id: &str,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError>;

    async fn get_project(&self, project_id: &str) -> Result<Project, ConnectorError>;
    async fn create_project(&self, project: &NewProject) -> Result<Project, ConnectorError>;
    async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ConnectorError>;
    async fn delete_project(&self, project_id: &str) -> Result<(), ConnectorError>;

    async fn get_user(&self, user_id: &str) -> Result<User, ConnectorError>;
    async fn create_user(&self, user: &NewUser) -> Result<User, ConnectorError>;
    async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<User, ConnectorError>;
    async fn delete_user(&self, user_id: &str) -> Result<(), ConnectorError>;

    async fn find_role(&self, name: &str) -> Result<Role, ConnectorError>;
    /// Role ids currently bound for the user on the project.
    async fn list_role_assignments(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<String>, ConnectorError>;
    async fn grant_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError>;
    async fn revoke_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError>;
}

/// One quota dimension of one backend service.
#[async_trait]
pub trait QuotaBackend: Send + Sync {
    /// Current limits and usage for the dimensions this backend owns.
    async fn get(&self, project_id: &str) -> Result<QuotaReading, ConnectorError>;
    /// Write new limits. Raises `BadRequest` when the backend rejects a
    /// limit below current usage.
    async fn set(&self, project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError>;
}

/// A compute instance as reported by the compute service.
#[derive(Debug, Clone)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// Compute service server operations used during quiesce.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn list_servers(&self, project_id: &str) -> Result<Vec<Server>, ConnectorError>;
    async fn stop_server(&self, server_id: &str) -> Result<(), ConnectorError>;
    /// Shutdown plus image snapshot; used for cancellations.
    async fn shelve_server(&self, server_id: &str) -> Result<(), ConnectorError>;
    async fn set_server_description(
        &self,
        server_id: &str,
        description: &str,
    ) -> Result<(), ConnectorError>;
}

/// One metering sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// How per-resource series of one metric are folded into a single
/// project-wide series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesAggregation {
    /// Sum of the per-resource means (capacity metrics).
    Sum,
    /// Number of resources carrying the metric (count metrics).
    Count,
}

/// Raw consumption series from the metering service. The query language
/// stays behind this boundary; callers only see samples.
#[async_trait]
pub trait MeteringBackend: Send + Sync {
    /// Project-wide aggregated series for one metric.
    async fn series(
        &self,
        project_id: &str,
        metric: &str,
        aggregation: SeriesAggregation,
        window: &UsageWindow,
    ) -> Result<Vec<Measure>, ConnectorError>;

    /// One monotonic counter series per network interface of the project.
    async fn per_interface_series(
        &self,
        project_id: &str,
        metric: &str,
        window: &UsageWindow,
    ) -> Result<Vec<Vec<Measure>>, ConnectorError>;
}

/// Computes the billable quantity of one resource item for a window.
#[async_trait]
pub trait ConsumptionSource: Send + Sync {
    async fn collect(
        &self,
        project_id: &str,
        window: &UsageWindow,
    ) -> Result<f64, ConnectorError>;
}

/// The commerce platform: request source/sink and usage-file store.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    async fn list_pending_fulfillments(
        &self,
        products: &[String],
    ) -> Result<Vec<FulfillmentRequest>, ConnectorError>;
    async fn approve(
        &self,
        request_id: &str,
        answer: &ActivationAnswer,
    ) -> Result<(), ConnectorError>;
    async fn fail(&self, request_id: &str, reason: &str) -> Result<(), ConnectorError>;
    async fn inquire(&self, request_id: &str, params: &[Param]) -> Result<(), ConnectorError>;
    async fn update_request_params(
        &self,
        request_id: &str,
        params: &[Param],
    ) -> Result<(), ConnectorError>;
    /// A parameter from the tier-1 partner configuration of an account.
    async fn tier_config_param(
        &self,
        account_id: &str,
        param_id: &str,
    ) -> Result<Option<Param>, ConnectorError>;

    async fn list_assets(
        &self,
        products: &[String],
        statuses: &[AssetStatus],
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Asset>, ConnectorError>;
    /// Usage files matching a report name, filtered by product.
    async fn list_usage_files(
        &self,
        name: &str,
        products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError>;
    async fn create_usage_file(
        &self,
        draft: &UsageFileDraft,
        records: &[UsageRecord],
    ) -> Result<UsageFileInfo, ConnectorError>;
    /// Usage files awaiting connector action (`ready` or `pending`).
    async fn list_actionable_usage_files(
        &self,
        products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError>;
    async fn submit_usage_file(&self, file_id: &str) -> Result<(), ConnectorError>;
    async fn accept_usage_file(&self, file_id: &str, note: &str) -> Result<(), ConnectorError>;
}
