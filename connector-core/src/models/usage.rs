//! Usage window, record and file models.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::Serialize;

/// Half-open `[start, end)` reporting interval. Successive windows for
/// one account are contiguous: the `end` of one window is persisted and
/// becomes the `start` of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsageWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "usage window start must not exceed end");
        Self { start, end }
    }
}

/// Truncate to the midnight boundary of the same UTC day.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Drop sub-second precision, matching the stored metadata format.
pub fn truncate_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Serialize a timestamp the way project metadata stores it: naive UTC
/// isoformat without sub-seconds.
pub fn format_report_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// One metered quantity for one billable item over one window.
/// Immutable once submitted.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub usage_record_id: String,
    pub item_search_criteria: String,
    pub item_search_value: String,
    pub quantity: f64,
    pub start_time_utc: String,
    pub end_time_utc: String,
    pub asset_search_criteria: String,
    pub asset_search_value: String,
}

impl UsageRecord {
    pub fn new(project_id: &str, mpn: &str, quantity: f64, window: &UsageWindow) -> Self {
        Self {
            usage_record_id: format!(
                "{}-{}-{}",
                project_id,
                window.end.format("%Y-%m-%dT%H:%M:%S"),
                mpn
            ),
            item_search_criteria: "item.mpn".to_string(),
            item_search_value: mpn.to_string(),
            quantity,
            start_time_utc: window.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_time_utc: window.end.format("%Y-%m-%d %H:%M:%S").to_string(),
            asset_search_criteria: "parameter.project_id".to_string(),
            asset_search_value: project_id.to_string(),
        }
    }
}

/// Marketplace-side usage file lifecycle status. The connector only
/// reads this to decide whether a window may advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageFileStatus {
    Draft,
    Uploading,
    Processing,
    Ready,
    Pending,
    Accepted,
    Rejected,
    Invalid,
    Deleted,
    Unknown,
}

impl UsageFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageFileStatus::Draft => "draft",
            UsageFileStatus::Uploading => "uploading",
            UsageFileStatus::Processing => "processing",
            UsageFileStatus::Ready => "ready",
            UsageFileStatus::Pending => "pending",
            UsageFileStatus::Accepted => "accepted",
            UsageFileStatus::Rejected => "rejected",
            UsageFileStatus::Invalid => "invalid",
            UsageFileStatus::Deleted => "deleted",
            UsageFileStatus::Unknown => "unknown",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => UsageFileStatus::Draft,
            "uploading" => UsageFileStatus::Uploading,
            "processing" => UsageFileStatus::Processing,
            "ready" => UsageFileStatus::Ready,
            "pending" => UsageFileStatus::Pending,
            "accepted" => UsageFileStatus::Accepted,
            "rejected" => UsageFileStatus::Rejected,
            "invalid" => UsageFileStatus::Invalid,
            "deleted" => UsageFileStatus::Deleted,
            _ => UsageFileStatus::Unknown,
        }
    }

    /// Still moving through marketplace-side validation.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            UsageFileStatus::Processing | UsageFileStatus::Draft | UsageFileStatus::Uploading
        )
    }

    /// Validation failed; waits for manual cleanup.
    pub fn is_failed(&self) -> bool {
        matches!(self, UsageFileStatus::Invalid | UsageFileStatus::Rejected)
    }
}

/// A usage file as listed by the marketplace.
#[derive(Debug, Clone)]
pub struct UsageFileInfo {
    pub id: String,
    pub name: String,
    pub status: UsageFileStatus,
    pub product_id: String,
}

/// A new usage file to be created with its records.
#[derive(Debug, Clone)]
pub struct UsageFileDraft {
    pub name: String,
    pub description: String,
    pub product_id: String,
    pub contract_id: String,
}
