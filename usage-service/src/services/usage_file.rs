//! Usage-file confirmation: push created files through marketplace
//! validation without operator involvement.

use connector_core::backends::CommercePlatform;
use connector_core::config::Config;
use connector_core::error::ConnectorError;
use connector_core::models::UsageFileStatus;
use std::sync::Arc;
use tracing::{error, info};

pub struct UsageFileConfirmer {
    commerce: Arc<dyn CommercePlatform>,
    config: Config,
}

impl UsageFileConfirmer {
    pub fn new(commerce: Arc<dyn CommercePlatform>, config: Config) -> Self {
        Self { commerce, config }
    }

    /// Submit every `ready` file and accept every `pending` one.
    /// Per-file errors are logged; the rest of the batch continues.
    pub async fn process_all(&self) -> Result<(), ConnectorError> {
        let products = self.config.marketplace.usage_products().to_vec();
        let files = self.commerce.list_actionable_usage_files(&products).await?;
        info!(files = files.len(), "Processing usage files");

        for file in &files {
            let result = match file.status {
                UsageFileStatus::Ready => self.commerce.submit_usage_file(&file.id).await,
                UsageFileStatus::Pending => {
                    self.commerce
                        .accept_usage_file(&file.id, "Automatically confirmed")
                        .await
                }
                _ => continue,
            };
            match result {
                Ok(()) => info!(
                    file_id = %file.id,
                    name = %file.name,
                    status = file.status.as_str(),
                    "Usage file advanced"
                ),
                Err(e) => error!(
                    file_id = %file.id,
                    name = %file.name,
                    error = %e,
                    "Unable to advance usage file"
                ),
            }
        }
        Ok(())
    }
}
