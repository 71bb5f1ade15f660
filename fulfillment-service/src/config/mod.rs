//! Configuration module for fulfillment-service.

use connector_core::config::Config;
use connector_core::error::ConnectorError;
use std::env;

#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    pub common: Config,
    pub service_name: String,
    pub log_level: String,
}

impl FulfillmentConfig {
    pub fn from_env() -> Result<Self, ConnectorError> {
        let common = Config::load()?;
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| common.log_level.clone());

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "fulfillment-service".to_string()),
            log_level,
        })
    }
}
