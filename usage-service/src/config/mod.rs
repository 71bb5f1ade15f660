//! Configuration module for usage-service.

use connector_core::config::Config;
use connector_core::error::ConnectorError;
use std::env;

#[derive(Debug, Clone)]
pub struct UsageConfig {
    pub common: Config,
    pub service_name: String,
    pub log_level: String,
    /// Restrict the run to a single account. Pinned runs may submit a
    /// partial (current-day) report but never advance the report clock.
    pub target_project_id: Option<String>,
}

impl UsageConfig {
    pub fn from_env() -> Result<Self, ConnectorError> {
        let common = Config::load()?;
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| common.log_level.clone());

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "usage-service".to_string()),
            log_level,
            target_project_id: env::var("TARGET_PROJECT_ID").ok().filter(|v| !v.is_empty()),
        })
    }
}
