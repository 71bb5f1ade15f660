//! connector-core: Shared infrastructure for the connector services.
pub mod backends;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;

pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
