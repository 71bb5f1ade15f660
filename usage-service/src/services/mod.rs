//! Usage reporting services.

pub mod consumption;
pub mod report;
pub mod usage_file;
pub mod window;

pub use consumption::ConsumptionCatalog;
pub use report::UsageReporter;
pub use usage_file::UsageFileConfirmer;
