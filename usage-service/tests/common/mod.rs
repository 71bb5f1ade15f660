//! Shared mock backends and fixtures for the usage-reporting
//! integration tests. Only the identity and commerce surfaces the
//! reporter touches are modelled; consumption comes from fixed sources.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connector_core::backends::{CommercePlatform, ConsumptionSource, IdentityBackend};
use connector_core::config::{
    Config, InfraConfig, MarketplaceConfig, MiscConfig, ProductTemplates,
};
use connector_core::error::ConnectorError;
use connector_core::models::{
    ActivationAnswer, Asset, AssetStatus, BillableItem, Domain, FulfillmentRequest, NewProject,
    NewUser, Param, Project, ProjectUpdate, Role, Tier, UsageFileDraft, UsageFileInfo,
    UsageFileStatus, UsageRecord, UsageWindow, User, UserUpdate,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use usage_service::services::{ConsumptionCatalog, UsageReporter};

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
        templates: HashMap::new(),
        misc: MiscConfig::default(),
        data_retention_days: 15,
        log_level: "debug".to_string(),
    }
}

pub fn products() -> Vec<String> {
    vec!["PRD-1".to_string()]
}

/// An asset carrying one metered item, tied to project `p1`.
pub fn usage_asset(status: AssetStatus) -> Asset {
    Asset {
        id: "AS-1".to_string(),
        status,
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
        params: vec![Param {
            id: "project_id".to_string(),
            value: Some("p1".to_string()),
            value_error: None,
        }],
        items: vec![BillableItem {
            mpn: "CPU_consumption".to_string(),
            quantity: 0,
            hard_limit: -1,
        }],
    }
}

pub fn project(
    last: Option<String>,
    confirmed: Option<bool>,
    start: Option<String>,
    stop: Option<String>,
) -> Project {
    Project {
        id: "p1".to_string(),
        name: "AS-1".to_string(),
        domain_id: "d-1".to_string(),
        description: Some("AS-1".to_string()),
        enabled: true,
        last_usage_report_time: last,
        last_usage_report_confirmed: confirmed,
        start_usage_report_time: start,
        stop_usage_report_time: stop,
    }
}

pub fn usage_file(id: &str, name: &str, status: UsageFileStatus) -> UsageFileInfo {
    UsageFileInfo {
        id: id.to_string(),
        name: name.to_string(),
        status,
        product_id: "PRD-1".to_string(),
    }
}

/// Identity store reduced to project lookup and metadata updates.
#[derive(Default)]
pub struct MockIdentity {
    pub projects: Mutex<HashMap<String, Project>>,
    pub project_updates: Mutex<Vec<(String, ProjectUpdate)>>,
}

impl MockIdentity {
    pub fn with_project(project: Project) -> Arc<Self> {
        let mock = Self::default();
        mock.projects
            .lock()
            .unwrap()
            .insert(project.id.clone(), project);
        Arc::new(mock)
    }
}

#[async_trait]
impl IdentityBackend for MockIdentity {
    async fn get_domain(&self, _domain_id: &str) -> Result<Domain, ConnectorError> {
        unimplemented!()
    }

    async fn list_domains(&self, _name: Option<&str>) -> Result<Vec<Domain>, ConnectorError> {
        unimplemented!()
    }

    async fn create_domain(
        &self,
        _name: &str,
        _description: Option<&str>,
        _enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        unimplemented!()
    }

    async fn update_domain(
        &self,
        _domain_id: &str,
        _name: &str,
        _description: Option<&str>,
        _enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        unimplemented!()
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ConnectorError> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("project {project_id}")))
    }

    async fn create_project(&self, _project: &NewProject) -> Result<Project, ConnectorError> {
        unimplemented!()
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

    async fn delete_project(&self, _project_id: &str) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn get_user(&self, _user_id: &str) -> Result<User, ConnectorError> {
        unimplemented!()
    }

    async fn create_user(&self, _user: &NewUser) -> Result<User, ConnectorError> {
        unimplemented!()
    }

    async fn update_user(
        &self,
        _user_id: &str,
        _update: &UserUpdate,
    ) -> Result<User, ConnectorError> {
        unimplemented!()
    }

    async fn delete_user(&self, _user_id: &str) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn find_role(&self, name: &str) -> Result<Role, ConnectorError> {
        Ok(Role {
            id: format!("role-{name}"),
            name: name.to_string(),
        })
    }

    async fn list_role_assignments(
        &self,
        _user_id: &str,
        _project_id: &str,
    ) -> Result<Vec<String>, ConnectorError> {
        unimplemented!()
    }

    async fn grant_role(
        &self,
        _role_id: &str,
        _user_id: &str,
        _project_id: &str,
    ) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn revoke_role(
        &self,
        _role_id: &str,
        _user_id: &str,
        _project_id: &str,
    ) -> Result<(), ConnectorError> {
        unimplemented!()
    }
}

/// Commerce platform reduced to the asset and usage-file surfaces.
#[derive(Default)]
pub struct MockCommerce {
    pub assets: Mutex<Vec<Asset>>,
    pub usage_files: Mutex<Vec<UsageFileInfo>>,
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
        unimplemented!()
    }

    async fn approve(
        &self,
        _request_id: &str,
        _answer: &ActivationAnswer,
    ) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn fail(&self, _request_id: &str, _reason: &str) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn inquire(&self, _request_id: &str, _params: &[Param]) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn update_request_params(
        &self,
        _request_id: &str,
        _params: &[Param],
    ) -> Result<(), ConnectorError> {
        unimplemented!()
    }

    async fn tier_config_param(
        &self,
        _account_id: &str,
        _param_id: &str,
    ) -> Result<Option<Param>, ConnectorError> {
        unimplemented!()
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

/// Consumption source returning a constant quantity.
pub struct FixedSource(pub f64);

#[async_trait]
impl ConsumptionSource for FixedSource {
    async fn collect(
        &self,
        _project_id: &str,
        _window: &UsageWindow,
    ) -> Result<f64, ConnectorError> {
        Ok(self.0)
    }
}

/// Reporter over the mocks, metering CPU at a fixed 4.0 per window.
pub fn reporter(
    commerce: Arc<MockCommerce>,
    identity: Arc<MockIdentity>,
    target_project_id: Option<String>,
) -> UsageReporter {
    let sources: HashMap<String, Arc<dyn ConsumptionSource>> = HashMap::from([(
        "CPU_consumption".to_string(),
        Arc::new(FixedSource(4.0)) as Arc<dyn ConsumptionSource>,
    )]);
    UsageReporter::new(
        commerce,
        identity,
        ConsumptionCatalog::from_sources(sources),
        test_config(),
        target_project_id,
    )
}
