//! Layered configuration for the connector services.
//!
//! Values come from an optional `connector.*` file (toml/yaml/json) plus
//! `CONNECTOR__`-prefixed environment variables, the latter winning.

use crate::error::ConnectorError;
use config::{Config as Cfg, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration shared by every runner.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub infra: InfraConfig,
    pub marketplace: MarketplaceConfig,
    /// Per-product activation answers, keyed by product id.
    #[serde(default)]
    pub templates: HashMap<String, ProductTemplates>,
    #[serde(default)]
    pub misc: MiscConfig,
    /// Days a cancelled account's data is kept before deletion.
    #[serde(default = "default_data_retention_days")]
    pub data_retention_days: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Credentials and endpoint of the infrastructure identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct InfraConfig {
    pub identity_endpoint: String,
    pub username: String,
    pub password: SecretString,
    #[serde(default = "default_infra_project")]
    pub project: String,
    #[serde(default = "default_infra_domain")]
    pub domain: String,
}

/// Marketplace (commerce platform) API access.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    pub api_endpoint: String,
    pub api_key: SecretString,
    /// Products processed by the fulfillment runner.
    #[serde(default)]
    pub products: Vec<String>,
    /// Products metered by the usage runner; falls back to `products`
    /// when empty.
    #[serde(default)]
    pub report_usage_products: Vec<String>,
}

impl MarketplaceConfig {
    pub fn usage_products(&self) -> &[String] {
        if self.report_usage_products.is_empty() {
            &self.products
        } else {
            &self.report_usage_products
        }
    }
}

/// `grant`/`revoke` answers for one product. Values starting with `TL`
/// are activation template ids, anything else is an inline tile.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductTemplates {
    #[serde(default)]
    pub grant: Option<String>,
    #[serde(default)]
    pub revoke: Option<String>,
}

/// Operational switches.
#[derive(Debug, Clone, Deserialize)]
pub struct MiscConfig {
    /// When false, domains are pre-created by an operator and looked up
    /// through the tier-1 `partner_id` parameter.
    #[serde(default = "default_true")]
    pub domain_creation: bool,
    /// Grant the `image_upload` role alongside `project_admin`.
    #[serde(default = "default_true")]
    pub image_upload: bool,
    /// Marketplace id reserved for test traffic.
    #[serde(default)]
    pub test_marketplace_id: Option<String>,
    /// When true, only requests from the test marketplace are processed.
    #[serde(default)]
    pub test_mode: bool,
    /// Billable item names reported with an explicit zero quantity
    /// instead of a metered value.
    #[serde(default)]
    pub report_zero_usage: Vec<String>,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            domain_creation: true,
            image_upload: true,
            test_marketplace_id: None,
            test_mode: false,
            report_zero_usage: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_infra_project() -> String {
    "admin".to_string()
}

fn default_infra_domain() -> String {
    "Default".to_string()
}

fn default_data_retention_days() -> i64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, ConnectorError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("connector").required(false))
            .add_source(config::Environment::with_prefix("CONNECTOR").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
