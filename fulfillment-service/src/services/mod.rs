//! Fulfillment processing services.

pub mod fulfillment;
pub mod provisioning;
pub mod quota;

pub use fulfillment::FulfillmentHandler;
pub use provisioning::Provisioner;
pub use quota::{DimensionRequest, QuotaBackends, QuotaKind, QuotaTransaction, QuotaUpdater};
