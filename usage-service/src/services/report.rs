//! Daily usage reporting per asset.
//!
//! Each cycle works out the next report window for every asset and
//! submits one usage file per account per day. The report clock only
//! advances after the previous day's file is confirmed accepted, so a
//! lost or still-processing file can never create a gap or an overlap.

use crate::services::consumption::ConsumptionCatalog;
use crate::services::window::{advance_past_start, clamp_to_stop, next_report_time};
use chrono::{DateTime, Duration, Utc};
use connector_core::backends::{CommercePlatform, IdentityBackend};
use connector_core::config::Config;
use connector_core::error::ConnectorError;
use connector_core::models::{
    format_report_time, start_of_day, Asset, AssetStatus, Project, ProjectUpdate, UsageFileDraft,
    UsageWindow,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Reports for halted assets are only chased for a few days after the
/// halt; older ones have already submitted their closing report.
const HALTED_LOOKBACK_DAYS: i64 = 5;

/// The metering pipeline lags real time slightly; a window is only
/// considered complete this long after its end.
const METERING_LAG_MINUTES: i64 = 10;

pub struct UsageReporter {
    commerce: Arc<dyn CommercePlatform>,
    identity: Arc<dyn IdentityBackend>,
    catalog: ConsumptionCatalog,
    config: Config,
    target_project_id: Option<String>,
}

impl UsageReporter {
    pub fn new(
        commerce: Arc<dyn CommercePlatform>,
        identity: Arc<dyn IdentityBackend>,
        catalog: ConsumptionCatalog,
        config: Config,
        target_project_id: Option<String>,
    ) -> Self {
        Self {
            commerce,
            identity,
            catalog,
            config,
            target_project_id,
        }
    }

    /// One full reporting cycle: closing reports for recently halted
    /// assets first, then the daily reports for active ones. Per-asset
    /// failures are logged and do not stop the batch.
    pub async fn process_all(&self) -> Result<(), ConnectorError> {
        let products = self.config.marketplace.usage_products().to_vec();

        let recently_halted = self
            .commerce
            .list_assets(
                &products,
                &[AssetStatus::Suspended, AssetStatus::Terminated],
                Some(Utc::now() - Duration::days(HALTED_LOOKBACK_DAYS)),
            )
            .await?;
        let active = self
            .commerce
            .list_assets(&products, &[AssetStatus::Active], None)
            .await?;

        info!(
            halted = recently_halted.len(),
            active = active.len(),
            "Processing usage reports"
        );
        for asset in recently_halted.iter().chain(active.iter()) {
            if let Err(e) = self.process_asset(asset, &products).await {
                error!(asset_id = %asset.id, error = %e, "Usage reporting failed for asset");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, asset, products), fields(asset_id = %asset.id))]
    pub async fn process_asset(
        &self,
        asset: &Asset,
        products: &[String],
    ) -> Result<(), ConnectorError> {
        if let Some(reason) = self.test_marketplace_filter(asset) {
            warn!(reason, "Skipping asset");
            return Ok(());
        }

        let Some(project) = self.resolve_project(asset).await? else {
            return Ok(());
        };
        let state = project.report_state()?;
        let halted = asset.status.is_halted();

        if halted && state.stop.is_none() {
            info!(
                project_id = %project.id,
                "Asset usage reporting was stopped without a stop marker"
            );
            return Ok(());
        }

        // A missing last report time also voids the stored confirmation.
        let (mut last, confirmed) = match state.last {
            Some(last) => (last, state.confirmed),
            None => (start_of_day(Utc::now()), None),
        };
        let mut report_time = next_report_time(last);
        info!(
            project_id = %project.id,
            last = %last,
            report_time = %report_time,
            confirmed = ?confirmed,
            "Report window candidate"
        );

        if let Some(target) = &self.target_project_id {
            if *target != project.id {
                info!(project_id = %project.id, "Not the targeted project, skipping");
                return Ok(());
            }
        }

        if confirmed == Some(false) {
            match self.check_previous_report(asset, &project, last, products).await? {
                PreviousReport::Accepted => {}
                PreviousReport::StillOpen => return Ok(()),
                // the previous file vanished; recreate it under the
                // same name instead of advancing
                PreviousReport::Vanished => report_time = last,
            }
        }

        if halted {
            let clamped = clamp_to_stop(last, report_time, state.stop);
            if clamped != report_time {
                info!(
                    project_id = %project.id,
                    status = asset.status.as_str(),
                    report_time = %clamped,
                    "Sending last report"
                );
                report_time = clamped;
            }
        }
        last = advance_past_start(last, report_time, state.start);

        let today = Utc::now() - Duration::minutes(METERING_LAG_MINUTES);
        if report_time > today && self.target_project_id.is_none() {
            info!(project_id = %project.id, "Usage is already reported");
            return Ok(());
        }

        let window = UsageWindow::new(last, report_time);
        let name = format!("Report for {} {}", asset.id, report_time.format("%Y-%m-%d"));
        info!(
            project_id = %project.id,
            start = %window.start,
            end = %window.end,
            "Creating usage report"
        );

        let records = self
            .catalog
            .collect_records(&asset.items, &project.id, &window)
            .await?;
        let draft = UsageFileDraft {
            name: name.clone(),
            description: name,
            product_id: asset.product_id.clone(),
            contract_id: asset.contract_id.clone(),
        };
        self.commerce.create_usage_file(&draft, &records).await?;

        if report_time > today {
            // targeted run submitting a partial day: the clock must not
            // advance past data that is still accumulating
            return Ok(());
        }
        self.persist_report_time(&project.id, report_time, false).await
    }

    async fn resolve_project(&self, asset: &Asset) -> Result<Option<Project>, ConnectorError> {
        let Some(project_id) = asset.param_value("project_id") else {
            error!(asset_id = %asset.id, "Project id is not set");
            return Ok(None);
        };
        match self.identity.get_project(project_id).await {
            Ok(project) => Ok(Some(project)),
            Err(ConnectorError::NotFound(_)) => {
                error!(asset_id = %asset.id, project_id, "Project not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Decide what happened to the unconfirmed previous report by
    /// looking it up by name on the marketplace side.
    async fn check_previous_report(
        &self,
        asset: &Asset,
        project: &Project,
        last: DateTime<Utc>,
        products: &[String],
    ) -> Result<PreviousReport, ConnectorError> {
        let report_name = format!("Report for {} {}", asset.id, last.format("%Y-%m-%d"));
        let files = self.commerce.list_usage_files(&report_name, products).await?;
        let found: Vec<_> = files
            .into_iter()
            .filter(|f| f.status != connector_core::models::UsageFileStatus::Deleted)
            .collect();

        if found.is_empty() {
            return Ok(PreviousReport::Vanished);
        }
        if found.len() > 2 {
            return Err(ConnectorError::Inconsistent(format!(
                "Found multiple reports with name {report_name}"
            )));
        }

        let report = &found[0];
        if report.status.is_in_flight() {
            info!(
                project_id = %project.id,
                report_name,
                "Usage report is being processed"
            );
            return Ok(PreviousReport::StillOpen);
        }
        if report.status.is_failed() {
            // waits for an operator to remove the failed file
            error!(project_id = %project.id, report_name, "Failed usage report found");
            return Ok(PreviousReport::StillOpen);
        }

        self.persist_report_time(&project.id, last, true).await?;
        Ok(PreviousReport::Accepted)
    }

    async fn persist_report_time(
        &self,
        project_id: &str,
        report_time: DateTime<Utc>,
        confirmed: bool,
    ) -> Result<(), ConnectorError> {
        let update = ProjectUpdate {
            last_usage_report_time: Some(Some(format_report_time(report_time))),
            last_usage_report_confirmed: Some(confirmed),
            ..Default::default()
        };
        self.identity.update_project(project_id, &update).await?;
        Ok(())
    }

    fn test_marketplace_filter(&self, asset: &Asset) -> Option<String> {
        let test_id = self.config.misc.test_marketplace_id.as_deref()?;
        if self.config.misc.test_mode && asset.marketplace_id != test_id {
            return Some("test mode is enabled and asset is not from the test marketplace".into());
        }
        if !self.config.misc.test_mode && asset.marketplace_id == test_id {
            return Some("test mode is disabled and asset is from the test marketplace".into());
        }
        None
    }
}

enum PreviousReport {
    /// Confirmed accepted; the window may advance.
    Accepted,
    /// In flight or failed; nothing to do this cycle.
    StillOpen,
    /// No live file under the expected name; it must be recreated.
    Vanished,
}
