//! Identity-provider account models.
//!
//! The identity provider is the durable store: usage-report state lives
//! as metadata on the project object and nowhere else.

use crate::error::ConnectorError;
use chrono::{DateTime, NaiveDateTime, Utc};
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Identity-provider project (the Account of a marketplace asset).
///
/// The `*_usage_report_*` fields are raw metadata strings; parsing is
/// deferred to [`Project::report_state`] so an unparseable value can be
/// classified as an inconsistency instead of silently defaulting.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub last_usage_report_time: Option<String>,
    pub last_usage_report_confirmed: Option<bool>,
    pub start_usage_report_time: Option<String>,
    pub stop_usage_report_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub description: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub domain_id: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub last_usage_report_time: Option<String>,
    pub start_usage_report_time: Option<String>,
    pub last_usage_report_confirmed: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub domain_id: String,
    pub password: SecretString,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Partial project update. For the report-time metadata fields,
/// `Some(None)` clears the stored value, `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub last_usage_report_time: Option<Option<String>>,
    pub last_usage_report_confirmed: Option<bool>,
    pub start_usage_report_time: Option<Option<String>>,
    pub stop_usage_report_time: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

/// Parsed usage-report state of an account.
#[derive(Debug, Clone, Default)]
pub struct ReportState {
    pub last: Option<DateTime<Utc>>,
    pub confirmed: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl Project {
    /// Parse the stored report-state metadata. An unparseable timestamp
    /// is an inconsistency: the caller abandons the cycle for this
    /// account rather than guessing a default.
    pub fn report_state(&self) -> Result<ReportState, ConnectorError> {
        Ok(ReportState {
            last: parse_report_time(self.last_usage_report_time.as_deref(), &self.id)?,
            confirmed: self.last_usage_report_confirmed,
            start: parse_report_time(self.start_usage_report_time.as_deref(), &self.id)?,
            stop: parse_report_time(self.stop_usage_report_time.as_deref(), &self.id)?,
        })
    }
}

fn parse_report_time(
    value: Option<&str>,
    project_id: &str,
) -> Result<Option<DateTime<Utc>>, ConnectorError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(parsed) = raw.parse::<DateTime<Utc>>() {
        return Ok(Some(parsed));
    }
    // Stored values are naive UTC isoformat timestamps.
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(parsed.and_utc()));
    }

    Err(ConnectorError::Inconsistent(format!(
        "{project_id}: unable to parse report time \"{raw}\""
    )))
}
