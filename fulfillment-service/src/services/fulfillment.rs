//! Fulfillment request processing.
//!
//! Each pending marketplace request maps to one terminal outcome:
//! approve with an activation answer, fail with a reason, inquire with
//! corrected parameters, or skip. Unexpected backend errors leave the
//! request pending for the next cycle.

use crate::services::provisioning::{pwgen, Provisioner, ServerAction};
use crate::services::quota::{DimensionRequest, QuotaBackends, QuotaKind, QuotaTransaction};
use chrono::{Duration, Utc};
use connector_core::backends::{CommercePlatform, IdentityBackend};
use connector_core::config::Config;
use connector_core::error::ConnectorError;
use connector_core::models::{
    format_report_time, start_of_day, truncate_seconds, ActivationAnswer, Asset, AssetStatus,
    BillableItem, FulfillmentOutcome, FulfillmentRequest, Param, Project, ProjectUpdate, QuotaSpec,
    RequestKind,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const HARD_LIMIT_EXCEEDED: &str = "ERROR: REQUESTED LIMITS ARE HIGHER THEN HARD LIMITS";
const ZERO_BASE_LIMITS: &str = "CPU, RAM, and Storage limits cannot be 0";
const PROJECT_NAME_TAKEN: &str =
    "This project name is already taken, please choose a different name";
const USER_NAME_TAKEN: &str = "This user name is already taken, please choose a different name";

pub struct FulfillmentHandler {
    commerce: Arc<dyn CommercePlatform>,
    identity: Arc<dyn IdentityBackend>,
    provisioner: Provisioner,
    quota_backends: QuotaBackends,
    config: Config,
}

impl FulfillmentHandler {
    pub fn new(
        commerce: Arc<dyn CommercePlatform>,
        identity: Arc<dyn IdentityBackend>,
        provisioner: Provisioner,
        quota_backends: QuotaBackends,
        config: Config,
    ) -> Self {
        Self {
            commerce,
            identity,
            provisioner,
            quota_backends,
            config,
        }
    }

    /// Process one request and report the outcome back to the
    /// marketplace.
    #[instrument(skip(self, request), fields(request_id = %request.id, asset_id = %request.asset.id))]
    pub async fn handle(&self, request: &FulfillmentRequest) -> Result<(), ConnectorError> {
        let outcome = self.process(request).await?;
        match outcome {
            FulfillmentOutcome::Approve(answer) => {
                self.commerce.approve(&request.id, &answer).await?;
                info!("Request approved");
            }
            FulfillmentOutcome::Fail(reason) => {
                self.commerce.fail(&request.id, &reason).await?;
                info!(reason, "Request failed");
            }
            FulfillmentOutcome::Inquire(params) => {
                self.commerce.inquire(&request.id, &params).await?;
                info!("Request returned to the customer for correction");
            }
            FulfillmentOutcome::Skip(reason) => {
                info!(reason = reason.as_deref().unwrap_or(""), "Request skipped");
            }
        }
        Ok(())
    }

    /// Decide the outcome of one request without reporting it.
    pub async fn process(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentOutcome, ConnectorError> {
        if request.needs_migration {
            // Migration is performed by an external service.
            return Ok(FulfillmentOutcome::Skip(Some(format!(
                "request {} needs migration",
                request.id
            ))));
        }
        if let Some(reason) = self.test_marketplace_filter(&request.asset) {
            return Ok(FulfillmentOutcome::Skip(Some(reason)));
        }

        let partner_id = if self.config.misc.domain_creation {
            None
        } else {
            match self.tier_partner_id(request).await? {
                Ok(partner_id) => Some(partner_id),
                Err(skip) => return Ok(skip),
            }
        };

        match request.kind {
            kind if kind.is_provisioning() => self.provision(request, partner_id.as_deref()).await,
            RequestKind::Suspend => self.suspend(&request.asset).await,
            RequestKind::Cancel => self.cancel(&request.asset).await,
            _ => {
                warn!(kind = request.kind.as_str(), "Do not know what to do with such request");
                Ok(FulfillmentOutcome::Skip(None))
            }
        }
    }

    /// Domain name for manual domain mode, from the tier-1 partner
    /// configuration. Misconfiguration skips the request with a hint.
    async fn tier_partner_id(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<Result<String, FulfillmentOutcome>, ConnectorError> {
        let tier1 = &request.asset.tier1;
        let param = self
            .commerce
            .tier_config_param(&tier1.id, "partner_id")
            .await?;
        Ok(match param {
            None => Err(FulfillmentOutcome::Skip(Some(format!(
                "misconfiguration: there is no \"partner_id\" parameter in tier1 \"{}\" config",
                tier1.id
            )))),
            Some(param) => match param.value() {
                None => Err(FulfillmentOutcome::Skip(Some(format!(
                    "please specify \"partner_id\" parameter value in tier1 \"{}\" config",
                    tier1.id
                )))),
                Some(value) => Ok(value.to_string()),
            },
        })
    }

    fn test_marketplace_filter(&self, asset: &Asset) -> Option<String> {
        let test_id = self.config.misc.test_marketplace_id.as_deref()?;
        if self.config.misc.test_mode && asset.marketplace_id != test_id {
            return Some("test mode is enabled and request came not from test marketplace".into());
        }
        if !self.config.misc.test_mode && asset.marketplace_id == test_id {
            return Some("test mode is disabled and request came from test marketplace".into());
        }
        None
    }

    async fn provision(
        &self,
        request: &FulfillmentRequest,
        partner_id: Option<&str>,
    ) -> Result<FulfillmentOutcome, ConnectorError> {
        let asset = &request.asset;

        let domain = match partner_id {
            Some(partner_id) => {
                match self.provisioner.find_domain_by_description(partner_id).await? {
                    Some(domain) => domain,
                    None => {
                        return Ok(FulfillmentOutcome::Skip(Some(format!(
                            "request {} needs a manually created domain; no domain with \
                             description \"{partner_id}\" found",
                            request.id
                        ))));
                    }
                }
            }
            None => {
                self.provisioner
                    .create_or_update_domain(
                        &asset.customer.id,
                        Some(&asset.customer.name),
                        asset.param_value("domain_id"),
                    )
                    .await?
            }
        };

        let project_name = asset.param_value("project").unwrap_or(&asset.id);
        let project = self
            .provisioner
            .create_project(
                asset.param_value("project_id"),
                project_name,
                &domain.id,
                &asset.id,
            )
            .await?;

        let user_name = asset.param_value("user").unwrap_or(&asset.id);
        let password: SecretString = asset
            .param_value("password")
            .map(|p| p.to_string())
            .unwrap_or_else(|| pwgen(24))
            .into();
        let user = self
            .provisioner
            .create_user(
                asset.param_value("user_id"),
                user_name,
                &domain.id,
                password,
                &asset.id,
            )
            .await?;

        // A taken name is a customer problem, not a crash: hand the
        // offending parameters back and drop whatever half got created.
        let mut conflicts = Vec::new();
        if project.is_none() {
            if let Some(param) = asset.param("project") {
                let mut param = param.clone();
                param.value_error = Some(PROJECT_NAME_TAKEN.to_string());
                conflicts.push(param);
            }
        }
        if user.is_none() {
            if let Some(param) = asset.param("user") {
                let mut param = param.clone();
                param.value_error = Some(USER_NAME_TAKEN.to_string());
                conflicts.push(param);
            }
        }
        if !conflicts.is_empty() {
            if let Some(user) = &user {
                self.identity.delete_user(&user.id).await?;
            }
            if let Some(project) = &project {
                self.identity.delete_project(&project.id).await?;
            }
            return Ok(FulfillmentOutcome::Inquire(conflicts));
        }
        let user = user.ok_or_else(|| anyhow::anyhow!("unable to create a user"))?;
        let project = project.ok_or_else(|| anyhow::anyhow!("unable to create a project"))?;

        self.write_back_params(
            request,
            &[
                ("domain_name", &domain.name),
                ("domain_id", &domain.id),
                ("project_id", &project.id),
                ("user_id", &user.id),
            ],
        )
        .await?;

        let mut roles = vec!["project_admin"];
        if self.config.misc.image_upload {
            roles.push("image_upload");
        }
        self.provisioner
            .reconcile_roles(&user.id, &project.id, &roles)
            .await?;

        match self.reconcile_quotas(asset, &project.id).await? {
            Ok(()) => {}
            Err(reason) => {
                // Purchases own the project they created; later request
                // types must not destroy a live account on failure.
                if request.kind == RequestKind::Purchase {
                    self.identity.delete_project(&project.id).await?;
                }
                return Ok(FulfillmentOutcome::Fail(reason));
            }
        }

        let Some(answer) = self.answer(&asset.product_id, "grant") else {
            warn!(product_id = %asset.product_id, "No grant answer configured");
            return Ok(FulfillmentOutcome::Skip(None));
        };

        if !project.enabled {
            self.reopen_reporting(&project).await?;
        }

        Ok(FulfillmentOutcome::Approve(answer))
    }

    /// Re-enable a previously suspended project, repairing the
    /// usage-report markers. A stop marker matching the last report
    /// time means the closing report went out, so a fresh interval
    /// starts now; otherwise both markers are cleared and the gap
    /// between stop and start is deliberately not billed.
    async fn reopen_reporting(&self, project: &Project) -> Result<(), ConnectorError> {
        let state = project.report_state()?;
        let last = state.last.unwrap_or_else(|| start_of_day(Utc::now()));
        let keep_stop = state.stop.is_some_and(|stop| stop == last);

        let update = if keep_stop {
            ProjectUpdate {
                enabled: Some(true),
                start_usage_report_time: Some(Some(format_report_time(truncate_seconds(
                    Utc::now(),
                )))),
                ..Default::default()
            }
        } else {
            ProjectUpdate {
                enabled: Some(true),
                start_usage_report_time: Some(None),
                stop_usage_report_time: Some(None),
                ..Default::default()
            }
        };
        self.identity.update_project(&project.id, &update).await?;
        Ok(())
    }

    /// Run the quota transaction for the asset's billable items.
    /// `Err(reason)` in the inner result is a user-facing fail outcome.
    async fn reconcile_quotas(
        &self,
        asset: &Asset,
        project_id: &str,
    ) -> Result<Result<(), String>, ConnectorError> {
        let cpu = match item_quota(asset, &["cpu_limit", "cpu_consumption"]) {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };
        let ram = match item_quota(asset, &["ram_limit", "ram_consumption"]) {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };
        let storage = match item_quota(asset, &["storage_limit", "storage_consumption"]) {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };
        if cpu == 0 || ram == 0 || storage == 0 {
            return Ok(Err(ZERO_BASE_LIMITS.to_string()));
        }
        let floating_ip = match item_quota(asset, &["floating_ip_limit", "floating_ip_consumption"])
        {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };
        let load_balancer = match item_quota(asset, &["lbaas_limit", "lb_consumption"]) {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };
        let clusters = match item_quota(asset, &["k8saas_limit", "k8s_consumption"]) {
            Ok(v) => v,
            Err(reason) => return Ok(Err(reason)),
        };

        let requests = vec![
            DimensionRequest {
                kind: QuotaKind::Storage,
                limits: QuotaSpec::new().with("gigabytes_default", storage),
            },
            DimensionRequest {
                kind: QuotaKind::Compute,
                limits: QuotaSpec::new()
                    .with("cores", cpu)
                    .with("ram", if ram > 0 { ram * 1024 } else { ram }),
            },
            DimensionRequest {
                kind: QuotaKind::Network,
                limits: QuotaSpec::new().with("floatingip", floating_ip),
            },
            DimensionRequest {
                kind: QuotaKind::LoadBalancer,
                limits: QuotaSpec::new().with("load_balancer", load_balancer),
            },
            DimensionRequest {
                kind: QuotaKind::Container,
                limits: QuotaSpec::new().with("hard_limit", clusters),
            },
        ];

        let transaction = QuotaTransaction::new(&self.quota_backends, project_id);
        match transaction.run(requests).await {
            Ok(()) => Ok(Ok(())),
            Err(ConnectorError::Rejected(reason)) => Ok(Err(reason)),
            Err(e) => Err(e),
        }
    }

    async fn suspend(&self, asset: &Asset) -> Result<FulfillmentOutcome, ConnectorError> {
        let project_id = asset.param_value("project_id");
        let user_id = asset.param_value("user_id");

        self.provisioner
            .operate_servers(project_id, ServerAction::Stop, None)
            .await?;
        self.provisioner.suspend_user(user_id, None).await;
        self.provisioner
            .suspend_project(project_id, asset.status == AssetStatus::Suspended, None)
            .await;

        Ok(FulfillmentOutcome::Approve(self.revoke_answer(&asset.product_id)))
    }

    async fn cancel(&self, asset: &Asset) -> Result<FulfillmentOutcome, ConnectorError> {
        let project_id = asset.param_value("project_id");
        let user_id = asset.param_value("user_id");

        let retention_end = Utc::now() + Duration::days(self.config.data_retention_days);
        let description = format!(
            "SCHEDULED FOR DELETION AFTER {}",
            retention_end.format("%Y-%m-%d")
        );

        self.provisioner
            .operate_servers(project_id, ServerAction::Shelve, Some(&description))
            .await?;
        self.provisioner
            .suspend_user(user_id, Some(&description))
            .await;
        self.provisioner
            .suspend_project(
                project_id,
                asset.status == AssetStatus::Suspended,
                Some(&description),
            )
            .await;

        Ok(FulfillmentOutcome::Approve(self.revoke_answer(&asset.product_id)))
    }

    /// Push changed account parameters back to the request.
    async fn write_back_params(
        &self,
        request: &FulfillmentRequest,
        values: &[(&str, &String)],
    ) -> Result<(), ConnectorError> {
        let mut updates = Vec::new();
        for (id, value) in values {
            if let Some(param) = request.asset.param(id) {
                if param.value.as_deref() != Some(value.as_str()) {
                    updates.push(Param {
                        id: (*id).to_string(),
                        value: Some((*value).clone()),
                        value_error: None,
                    });
                }
            }
        }
        if !updates.is_empty() {
            self.commerce
                .update_request_params(&request.id, &updates)
                .await?;
        }
        Ok(())
    }

    fn answer(&self, product_id: &str, which: &str) -> Option<ActivationAnswer> {
        let templates = self.config.templates.get(product_id)?;
        let value = match which {
            "grant" => templates.grant.as_deref(),
            _ => templates.revoke.as_deref(),
        }?;
        Some(ActivationAnswer::from_config_value(value))
    }

    /// Suspension and cancellation approve with the revoke answer, or
    /// an empty tile when none is configured.
    fn revoke_answer(&self, product_id: &str) -> ActivationAnswer {
        self.answer(product_id, "revoke")
            .unwrap_or_else(|| ActivationAnswer::Tile(String::new()))
    }
}

/// Requested limit for one billable item, honoring its hard ceiling.
/// Missing item means no request for the dimension; a negative
/// quantity falls back to the ceiling (unlimited when none is set).
fn item_quota(asset: &Asset, mpns: &[&str]) -> Result<i64, String> {
    let item: Option<&BillableItem> = mpns.iter().find_map(|mpn| asset.item(mpn));
    let Some(item) = item else {
        return Ok(0);
    };

    let mut quantity = item.quantity;
    if item.hard_limit >= 0 && quantity > item.hard_limit {
        return Err(HARD_LIMIT_EXCEEDED.to_string());
    }
    if quantity < 0 {
        quantity = item.hard_limit;
    }
    Ok(quantity)
}
