//! Domain models shared by the connector services.

pub mod account;
pub mod marketplace;
pub mod quota;
pub mod usage;

pub use account::{
    Domain, NewProject, NewUser, Project, ProjectUpdate, ReportState, Role, User, UserUpdate,
};
pub use marketplace::{
    ActivationAnswer, Asset, AssetStatus, BillableItem, FulfillmentOutcome, FulfillmentRequest,
    Param, RequestKind, Tier,
};
pub use quota::{QuotaReading, QuotaSpec, UNLIMITED};
pub use usage::{
    format_report_time, start_of_day, truncate_seconds, UsageFileDraft, UsageFileInfo,
    UsageFileStatus, UsageRecord, UsageWindow,
};
