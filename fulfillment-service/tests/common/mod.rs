//! Shared mock backends and fixtures for the fulfillment integration
//! tests. Every mock records its mutating calls so tests can assert on
//! ordering and on what was written.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connector_core::backends::{
    CommercePlatform, ComputeBackend, IdentityBackend, QuotaBackend, Server,
};
use connector_core::config::{
    Config, InfraConfig, MarketplaceConfig, MiscConfig, ProductTemplates,
};
use connector_core::error::ConnectorError;
use connector_core::models::{
    ActivationAnswer, Asset, AssetStatus, BillableItem, Domain, FulfillmentRequest, NewProject,
    NewUser, Param, Project, ProjectUpdate, QuotaReading, QuotaSpec, RequestKind, Role, Tier,
    UsageFileDraft, UsageFileInfo, UsageFileStatus, UsageRecord, User, UserUpdate,
};
use fulfillment_service::services::{FulfillmentHandler, Provisioner, QuotaBackends};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn test_config() -> Config {
    Config {
        infra: InfraConfig {
            identity_endpoint: "http://identity.test/v3".to_string(),
            username: "operator".to_string(),
            password: SecretString::new("secret".to_string()),
            project: "admin".to_string(),
            domain: "Default".to_string(),
        },
        marketplace: MarketplaceConfig {
            api_endpoint: "http://marketplace.test/public/v1".to_string(),
            api_key: SecretString::new("ApiKey test".to_string()),
            products: vec!["PRD-1".to_string()],
            report_usage_products: Vec::new(),
        },
        templates: HashMap::from([(
            "PRD-1".to_string(),
            ProductTemplates {
                grant: Some("TL-GRANT".to_string()),
                revoke: Some("TL-REVOKE".to_string()),
            },
        )]),
        misc: MiscConfig::default(),
        data_retention_days: 15,
        log_level: "debug".to_string(),
    }
}

pub fn param(id: &str, value: Option<&str>) -> Param {
    Param {
        id: id.to_string(),
        value: value.map(str::to_string),
        value_error: None,
    }
}

pub fn item(mpn: &str, quantity: i64, hard_limit: i64) -> BillableItem {
    BillableItem {
        mpn: mpn.to_string(),
        quantity,
        hard_limit,
    }
}

/// An active asset with the base resource items and empty account
/// parameters, as a fresh purchase carries them.
pub fn base_asset() -> Asset {
    Asset {
        id: "AS-1".to_string(),
        status: AssetStatus::Active,
        marketplace_id: "MP-1".to_string(),
        product_id: "PRD-1".to_string(),
        contract_id: "CRD-1".to_string(),
        customer: Tier {
            id: "TA-C".to_string(),
            name: "Customer Inc".to_string(),
        },
        tier1: Tier {
            id: "TA-1".to_string(),
            name: "Reseller".to_string(),
        },
        params: vec![
            param("project_id", None),
            param("user_id", None),
            param("project", None),
            param("user", None),
        ],
        items: vec![
            item("CPU_limit", 4, 64),
            item("RAM_limit", 8, -1),
            item("Storage_limit", 100, -1),
        ],
    }
}

pub fn request(kind: RequestKind, asset: Asset) -> FulfillmentRequest {
    FulfillmentRequest {
        id: "PR-1".to_string(),
        kind,
        needs_migration: false,
        asset,
    }
}

pub fn spec(pairs: &[(&str, i64)]) -> QuotaSpec {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn reading(limits: &[(&str, i64)], in_use: &[(&str, i64)]) -> QuotaReading {
    QuotaReading {
        limits: spec(limits),
        in_use: spec(in_use),
    }
}

/// In-memory identity provider. Name conflicts are simulated through
/// the `taken_*` lists.
#[derive(Default)]
pub struct MockIdentity {
    pub domains: Mutex<Vec<Domain>>,
    pub projects: Mutex<HashMap<String, Project>>,
    pub users: Mutex<HashMap<String, User>>,
    pub assignments: Mutex<HashMap<(String, String), Vec<String>>>,
    pub project_updates: Mutex<Vec<(String, ProjectUpdate)>>,
    pub deleted_projects: Mutex<Vec<String>>,
    pub deleted_users: Mutex<Vec<String>>,
    pub taken_project_names: Mutex<Vec<String>>,
    pub taken_user_names: Mutex<Vec<String>>,
    pub next_id: Mutex<u32>,
}

impl MockIdentity {
    fn next_id(&self) -> u32 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    pub fn stored_project(&self, id: &str) -> Project {
        self.projects
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .expect("project not stored")
    }

    pub fn single_project(&self) -> Project {
        let projects = self.projects.lock().unwrap();
        assert_eq!(projects.len(), 1, "expected exactly one project");
        projects.values().next().unwrap().clone()
    }
}

#[async_trait]
impl IdentityBackend for MockIdentity {
    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ConnectorError> {
        self.domains
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == domain_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("domain {domain_id}")))
    }

    async fn list_domains(&self, name: Option<&str>) -> Result<Vec<Domain>, ConnectorError> {
        Ok(self
            .domains
            .lock()
            .unwrap()
            .iter()
            .filter(|d| name.is_none() || name == Some(d.name.as_str()))
            .cloned()
            .collect())
    }

    async fn create_domain(
        &self,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        let domain = Domain {
            id: format!("d-{}", self.next_id()),
            name: name.to_string(),
            description: description.map(str::to_string),
            enabled,
        };
        self.domains.lock().unwrap().push(domain.clone());
        Ok(domain)
    }

    async fn update_domain(
        &self,
        domain_id: &str,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        let mut domains = self.domains.lock().unwrap();
        let domain = domains
            .iter_mut()
            .find(|d| d.id == domain_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("domain {domain_id}")))?;
        domain.name = name.to_string();
        domain.description = description.map(str::to_string);
        domain.enabled = enabled;
        Ok(domain.clone())
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ConnectorError> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("project {project_id}")))
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, ConnectorError> {
        if self
            .taken_project_names
            .lock()
            .unwrap()
            .contains(&project.name)
        {
            return Err(ConnectorError::Conflict(format!(
                "project name {} exists",
                project.name
            )));
        }
        let created = Project {
            id: format!("p-{}", self.next_id()),
            name: project.name.clone(),
            domain_id: project.domain_id.clone(),
            description: project.description.clone(),
            enabled: project.enabled,
            last_usage_report_time: project.last_usage_report_time.clone(),
            last_usage_report_confirmed: project.last_usage_report_confirmed,
            start_usage_report_time: project.start_usage_report_time.clone(),
            stop_usage_report_time: None,
        };
        self.projects
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ConnectorError> {
        self.project_updates
            .lock()
            .unwrap()
            .push((project_id.to_string(), update.clone()));
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("project {project_id}")))?;
        if let Some(enabled) = update.enabled {
            project.enabled = enabled;
        }
        if let Some(description) = &update.description {
            project.description = Some(description.clone());
        }
        if let Some(value) = &update.last_usage_report_time {
            project.last_usage_report_time = value.clone();
        }
        if let Some(confirmed) = update.last_usage_report_confirmed {
            project.last_usage_report_confirmed = Some(confirmed);
        }
        if let Some(value) = &update.start_usage_report_time {
            project.start_usage_report_time = value.clone();
        }
        if let Some(value) = &update.stop_usage_report_time {
            project.stop_usage_report_time = value.clone();
        }
        Ok(project.clone())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ConnectorError> {
        self.projects
            .lock()
            .unwrap()
            .remove(project_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("project {project_id}")))?;
        self.deleted_projects
            .lock()
            .unwrap()
            .push(project_id.to_string());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ConnectorError> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("user {user_id}")))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, ConnectorError> {
        if self.taken_user_names.lock().unwrap().contains(&user.name) {
            return Err(ConnectorError::Conflict(format!(
                "user name {} exists",
                user.name
            )));
        }
        let created = User {
            id: format!("u-{}", self.next_id()),
            name: user.name.clone(),
            domain_id: user.domain_id.clone(),
            description: user.description.clone(),
            enabled: user.enabled,
        };
        self.users
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<User, ConnectorError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("user {user_id}")))?;
        if let Some(enabled) = update.enabled {
            user.enabled = enabled;
        }
        if let Some(description) = &update.description {
            user.description = Some(description.clone());
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), ConnectorError> {
        self.users
            .lock()
            .unwrap()
            .remove(user_id)
            .ok_or_else(|| ConnectorError::NotFound(format!("user {user_id}")))?;
        self.deleted_users.lock().unwrap().push(user_id.to_string());
        Ok(())
    }

    async fn find_role(&self, name: &str) -> Result<Role, ConnectorError> {
        Ok(Role {
            id: format!("role-{name}"),
            name: name.to_string(),
        })
    }

    async fn list_role_assignments(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<String>, ConnectorError> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), project_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError> {
        let mut assignments = self.assignments.lock().unwrap();
        let bindings = assignments
            .entry((user_id.to_string(), project_id.to_string()))
            .or_default();
        if !bindings.contains(&role_id.to_string()) {
            bindings.push(role_id.to_string());
        }
        Ok(())
    }

    async fn revoke_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError> {
        let mut assignments = self.assignments.lock().unwrap();
        if let Some(bindings) =
            assignments.get_mut(&(user_id.to_string(), project_id.to_string()))
        {
            bindings.retain(|r| r != role_id);
        }
        Ok(())
    }
}

/// In-memory quota backend; `set` merges the requested limits into the
/// stored reading. Failure modes are configured at construction.
pub struct MockQuota {
    pub label: &'static str,
    pub state: Mutex<QuotaReading>,
    pub log: Arc<Mutex<Vec<String>>>,
    reject_set: bool,
    fail_set_after: Option<usize>,
    set_calls: Mutex<usize>,
}

impl MockQuota {
    pub fn new(
        label: &'static str,
        state: QuotaReading,
        log: Arc<Mutex<Vec<String>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            state: Mutex::new(state),
            log,
            reject_set: false,
            fail_set_after: None,
            set_calls: Mutex::new(0),
        })
    }

    /// Backend that rejects every write as below current usage.
    pub fn rejecting(
        label: &'static str,
        state: QuotaReading,
        log: Arc<Mutex<Vec<String>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            state: Mutex::new(state),
            log,
            reject_set: true,
            fail_set_after: None,
            set_calls: Mutex::new(0),
        })
    }

    /// Backend whose writes start failing hard after `successes` of
    /// them succeeded.
    pub fn failing_after(
        label: &'static str,
        state: QuotaReading,
        log: Arc<Mutex<Vec<String>>>,
        successes: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            state: Mutex::new(state),
            log,
            reject_set: false,
            fail_set_after: Some(successes),
            set_calls: Mutex::new(0),
        })
    }

    pub fn limits(&self) -> QuotaSpec {
        self.state.lock().unwrap().limits.clone()
    }
}

#[async_trait]
impl QuotaBackend for MockQuota {
    async fn get(&self, _project_id: &str) -> Result<QuotaReading, ConnectorError> {
        self.log.lock().unwrap().push(format!("{}:get", self.label));
        Ok(self.state.lock().unwrap().clone())
    }

    async fn set(&self, _project_id: &str, limits: &QuotaSpec) -> Result<(), ConnectorError> {
        self.log.lock().unwrap().push(format!("{}:set", self.label));
        if self.reject_set {
            return Err(ConnectorError::BadRequest(format!(
                "{}: quota is below current usage",
                self.label
            )));
        }
        let mut calls = self.set_calls.lock().unwrap();
        *calls += 1;
        if let Some(successes) = self.fail_set_after {
            if *calls > successes {
                return Err(ConnectorError::Unavailable(format!(
                    "{} backend is down",
                    self.label
                )));
            }
        }
        let mut state = self.state.lock().unwrap();
        for (key, value) in limits.iter() {
            state.limits.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCompute {
    pub servers: Mutex<Vec<Server>>,
    pub stopped: Mutex<Vec<String>>,
    pub shelved: Mutex<Vec<String>>,
    pub descriptions: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ComputeBackend for MockCompute {
    async fn list_servers(&self, _project_id: &str) -> Result<Vec<Server>, ConnectorError> {
        Ok(self.servers.lock().unwrap().clone())
    }

    async fn stop_server(&self, server_id: &str) -> Result<(), ConnectorError> {
        self.stopped.lock().unwrap().push(server_id.to_string());
        Ok(())
    }

    async fn shelve_server(&self, server_id: &str) -> Result<(), ConnectorError> {
        self.shelved.lock().unwrap().push(server_id.to_string());
        Ok(())
    }

    async fn set_server_description(
        &self,
        server_id: &str,
        description: &str,
    ) -> Result<(), ConnectorError> {
        self.descriptions
            .lock()
            .unwrap()
            .push((server_id.to_string(), description.to_string()));
        Ok(())
    }
}

/// Recording commerce platform. Outcome reports and parameter updates
/// are captured for assertions.
#[derive(Default)]
pub struct MockCommerce {
    pub tier_params: Mutex<HashMap<String, Param>>,
    pub assets: Mutex<Vec<Asset>>,
    pub usage_files: Mutex<Vec<UsageFileInfo>>,
    pub approvals: Mutex<Vec<(String, ActivationAnswer)>>,
    pub failures: Mutex<Vec<(String, String)>>,
    pub inquiries: Mutex<Vec<(String, Vec<Param>)>>,
    pub param_updates: Mutex<Vec<(String, Vec<Param>)>>,
    pub created_files: Mutex<Vec<(UsageFileDraft, Vec<UsageRecord>)>>,
    pub submitted: Mutex<Vec<String>>,
    pub accepted: Mutex<Vec<(String, String)>>,
    pub submit_error_ids: Mutex<Vec<String>>,
}

#[async_trait]
impl CommercePlatform for MockCommerce {
    async fn list_pending_fulfillments(
        &self,
        _products: &[String],
    ) -> Result<Vec<FulfillmentRequest>, ConnectorError> {
        Ok(Vec::new())
    }

    async fn approve(
        &self,
        request_id: &str,
        answer: &ActivationAnswer,
    ) -> Result<(), ConnectorError> {
        self.approvals
            .lock()
            .unwrap()
            .push((request_id.to_string(), answer.clone()));
        Ok(())
    }

    async fn fail(&self, request_id: &str, reason: &str) -> Result<(), ConnectorError> {
        self.failures
            .lock()
            .unwrap()
            .push((request_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn inquire(&self, request_id: &str, params: &[Param]) -> Result<(), ConnectorError> {
        self.inquiries
            .lock()
            .unwrap()
            .push((request_id.to_string(), params.to_vec()));
        Ok(())
    }

    async fn update_request_params(
        &self,
        request_id: &str,
        params: &[Param],
    ) -> Result<(), ConnectorError> {
        self.param_updates
            .lock()
            .unwrap()
            .push((request_id.to_string(), params.to_vec()));
        Ok(())
    }

    async fn tier_config_param(
        &self,
        _account_id: &str,
        param_id: &str,
    ) -> Result<Option<Param>, ConnectorError> {
        Ok(self.tier_params.lock().unwrap().get(param_id).cloned())
    }

    async fn list_assets(
        &self,
        _products: &[String],
        statuses: &[AssetStatus],
        _updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Asset>, ConnectorError> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| statuses.contains(&a.status))
            .cloned()
            .collect())
    }

    async fn list_usage_files(
        &self,
        name: &str,
        _products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError> {
        Ok(self
            .usage_files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.name == name)
            .cloned()
            .collect())
    }

    async fn create_usage_file(
        &self,
        draft: &UsageFileDraft,
        records: &[UsageRecord],
    ) -> Result<UsageFileInfo, ConnectorError> {
        let mut created = self.created_files.lock().unwrap();
        created.push((draft.clone(), records.to_vec()));
        Ok(UsageFileInfo {
            id: format!("UF-{}", created.len()),
            name: draft.name.clone(),
            status: UsageFileStatus::Draft,
            product_id: draft.product_id.clone(),
        })
    }

    async fn list_actionable_usage_files(
        &self,
        _products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError> {
        Ok(self
            .usage_files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| {
                matches!(f.status, UsageFileStatus::Ready | UsageFileStatus::Pending)
            })
            .cloned()
            .collect())
    }

    async fn submit_usage_file(&self, file_id: &str) -> Result<(), ConnectorError> {
        if self
            .submit_error_ids
            .lock()
            .unwrap()
            .contains(&file_id.to_string())
        {
            return Err(ConnectorError::Unavailable(format!(
                "usage file {file_id} rejected by the API"
            )));
        }
        self.submitted.lock().unwrap().push(file_id.to_string());
        Ok(())
    }

    async fn accept_usage_file(&self, file_id: &str, note: &str) -> Result<(), ConnectorError> {
        self.accepted
            .lock()
            .unwrap()
            .push((file_id.to_string(), note.to_string()));
        Ok(())
    }
}

/// Fully wired handler environment with three quota dimensions and a
/// shared call log.
pub struct TestEnv {
    pub identity: Arc<MockIdentity>,
    pub commerce: Arc<MockCommerce>,
    pub compute: Arc<MockCompute>,
    pub storage_quota: Arc<MockQuota>,
    pub compute_quota: Arc<MockQuota>,
    pub network_quota: Arc<MockQuota>,
    pub quota_log: Arc<Mutex<Vec<String>>>,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let quota_log = Arc::new(Mutex::new(Vec::new()));
        Self {
            identity: Arc::new(MockIdentity::default()),
            commerce: Arc::new(MockCommerce::default()),
            compute: Arc::new(MockCompute::default()),
            storage_quota: MockQuota::new(
                "storage",
                reading(&[("gigabytes_default", 10), ("gigabytes", 10)], &[]),
                quota_log.clone(),
            ),
            compute_quota: MockQuota::new(
                "compute",
                reading(&[("cores", 2), ("ram", 4096)], &[]),
                quota_log.clone(),
            ),
            network_quota: MockQuota::new(
                "network",
                reading(&[("floatingip", 1)], &[("floatingip", 0)]),
                quota_log.clone(),
            ),
            quota_log,
            config: test_config(),
        }
    }

    pub fn quota_backends(&self) -> QuotaBackends {
        QuotaBackends {
            storage: Some(self.storage_quota.clone()),
            compute: Some(self.compute_quota.clone()),
            network: Some(self.network_quota.clone()),
            loadbalancer: None,
            container: None,
        }
    }

    pub fn handler(&self) -> FulfillmentHandler {
        let provisioner = Provisioner::new(self.identity.clone(), self.compute.clone());
        FulfillmentHandler::new(
            self.commerce.clone(),
            self.identity.clone(),
            provisioner,
            self.quota_backends(),
            self.config.clone(),
        )
    }
}
