//! Metering (time-series) service client.
//!
//! Queries stay inside this module; the rest of the connector only sees
//! [`Measure`] samples.

use crate::backends::{Measure, MeteringBackend, SeriesAggregation};
use crate::clients::session::IdentitySession;
use crate::error::ConnectorError;
use crate::models::UsageWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const GRANULARITY_SECONDS: u32 = 3600;

pub struct MeteringClient {
    session: Arc<IdentitySession>,
    endpoint: String,
}

impl MeteringClient {
    pub fn new(session: Arc<IdentitySession>, endpoint: String) -> Self {
        Self { session, endpoint }
    }

    fn window_query(window: &UsageWindow) -> [(&'static str, String); 3] {
        [
            ("start", window.start.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("stop", window.end.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ("granularity", GRANULARITY_SECONDS.to_string()),
        ]
    }

    /// Per-metric measures for one metric id. A missing metric or an
    /// empty aggregation window is an empty series, not an error.
    async fn metric_measures(
        &self,
        metric_id: &str,
        window: &UsageWindow,
    ) -> Result<Vec<Measure>, ConnectorError> {
        let url = format!("{}/v1/metric/{metric_id}/measures", self.endpoint);
        let response = self
            .session
            .http()
            .get(url)
            .query(&Self::window_query(window))
            .query(&[("aggregation", "mean")])
            .header("X-Auth-Token", self.session.token())
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            debug!(metric_id, status = %status, "No measures for metric");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ConnectorError::from_status(status, "metric measures"));
        }
        let body: Value = response.json().await?;
        Ok(parse_measures(&body))
    }
}

#[async_trait]
impl MeteringBackend for MeteringClient {
    async fn series(
        &self,
        project_id: &str,
        metric: &str,
        aggregation: SeriesAggregation,
        window: &UsageWindow,
    ) -> Result<Vec<Measure>, ConnectorError> {
        let url = format!("{}/v1/aggregates", self.endpoint);
        let fold = match aggregation {
            SeriesAggregation::Sum => "sum",
            SeriesAggregation::Count => "count",
        };
        let payload = json!({
            "operations": ["aggregate", fold, ["metric", metric, "mean"]],
            "search": {"=": {"project_id": project_id}},
            "resource_type": "generic",
        });
        let response = self
            .session
            .http()
            .post(url)
            .query(&Self::window_query(window))
            .json(&payload)
            .header("X-Auth-Token", self.session.token())
            .send()
            .await?;
        let status = response.status();
        // The aggregation endpoint answers 400 when no resource of the
        // project carries the metric. That is ordinary for unused items.
        if status == reqwest::StatusCode::BAD_REQUEST {
            debug!(project_id, metric, "Metric absent for project");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ConnectorError::from_status(status, "aggregate measures"));
        }
        let body: Value = response.json().await?;
        Ok(parse_measures(&body["measures"]["aggregated"]))
    }

    async fn per_interface_series(
        &self,
        project_id: &str,
        metric: &str,
        window: &UsageWindow,
    ) -> Result<Vec<Vec<Measure>>, ConnectorError> {
        let url = format!(
            "{}/v1/search/resource/instance_network_interface",
            self.endpoint
        );
        let payload = json!({"=": {"project_id": project_id}});
        let response = self
            .session
            .http()
            .post(url)
            .json(&payload)
            .header("X-Auth-Token", self.session.token())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::from_status(status, "search interfaces"));
        }
        let resources: Value = response.json().await?;
        let resources = resources.as_array().cloned().unwrap_or_default();

        let mut series = Vec::new();
        for resource in &resources {
            let Some(metric_id) = resource["metrics"][metric].as_str() else {
                continue;
            };
            let measures = self.metric_measures(metric_id, window).await?;
            if !measures.is_empty() {
                series.push(measures);
            }
        }
        Ok(series)
    }
}

/// Measures arrive as `[timestamp, granularity, value]` triples.
fn parse_measures(value: &Value) -> Vec<Measure> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let timestamp = row.first()?.as_str()?;
            let timestamp = DateTime::parse_from_rfc3339(timestamp)
                .ok()?
                .with_timezone(&Utc);
            let value = row.get(2)?.as_f64()?;
            Some(Measure { timestamp, value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn measures_parse_triples_and_skip_garbage() {
        let body = json!([
            ["2024-03-04T10:00:00+00:00", 3600.0, 4.0],
            ["not a timestamp", 3600.0, 9.0],
            ["2024-03-04T11:00:00+00:00", 3600.0, 6.5]
        ]);

        let measures = parse_measures(&body);
        assert_eq!(measures.len(), 2);
        assert_eq!(
            measures[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
        );
        assert_eq!(measures[1].value, 6.5);
    }
}
