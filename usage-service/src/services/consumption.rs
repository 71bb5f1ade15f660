//! Consumption collection: one source per billable item kind.
//!
//! Sources turn raw metering series into a single billable quantity
//! for a window. Items without a known source are not reported.

use async_trait::async_trait;
use chrono::{Duration, Timelike};
use connector_core::backends::{ConsumptionSource, MeteringBackend, SeriesAggregation};
use connector_core::error::ConnectorError;
use connector_core::models::{BillableItem, UsageRecord, UsageWindow};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Capacity or count metric sampled from the metering service.
///
/// Most metrics only carry a complete aggregate on the hour; for those
/// the intermediate samples are dropped before summing.
struct MeterSource {
    metering: Arc<dyn MeteringBackend>,
    metric: &'static str,
    aggregation: SeriesAggregation,
    rate: f64,
    hourly: bool,
}

#[async_trait]
impl ConsumptionSource for MeterSource {
    async fn collect(
        &self,
        project_id: &str,
        window: &UsageWindow,
    ) -> Result<f64, ConnectorError> {
        let measures = self
            .metering
            .series(project_id, self.metric, self.aggregation, window)
            .await?;
        let sum: f64 = measures
            .iter()
            .filter(|m| !self.hourly || m.timestamp.minute() == 0)
            .map(|m| m.value)
            .sum();
        // billable quantities for these sources are whole units
        Ok((sum / self.rate).trunc())
    }
}

/// Outgoing traffic, from per-interface monotonic byte counters.
/// Counter resets are ignored: only positive deltas accumulate.
struct TrafficSource {
    metering: Arc<dyn MeteringBackend>,
}

#[async_trait]
impl ConsumptionSource for TrafficSource {
    async fn collect(
        &self,
        project_id: &str,
        window: &UsageWindow,
    ) -> Result<f64, ConnectorError> {
        // the closing midnight sample lands a few minutes after the
        // boundary, so the query window is stretched slightly
        let query_window = UsageWindow::new(window.start, window.end + Duration::minutes(5));
        let series = self
            .metering
            .per_interface_series(project_id, "network.outgoing.bytes", &query_window)
            .await?;

        let mut bytes_out = 0.0;
        for interface in &series {
            let mut interface_bytes = 0.0;
            if let Some(first) = interface.first() {
                let mut previous = first.value;
                for measure in interface {
                    if previous < measure.value {
                        interface_bytes += measure.value - previous;
                    }
                    previous = measure.value;
                }
            }
            debug!(project_id, interface_bytes, "Interface outgoing traffic");
            bytes_out += interface_bytes;
        }

        Ok(round4(bytes_out / BYTES_PER_MIB))
    }
}

/// Explicit zero for items the deployment bills flat.
struct ZeroSource;

#[async_trait]
impl ConsumptionSource for ZeroSource {
    async fn collect(&self, _project_id: &str, _window: &UsageWindow) -> Result<f64, ConnectorError> {
        Ok(0.0)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Item-mpn to consumption-source mapping for one deployment.
pub struct ConsumptionCatalog {
    sources: HashMap<String, Arc<dyn ConsumptionSource>>,
}

impl ConsumptionCatalog {
    pub fn new(metering: Arc<dyn MeteringBackend>, report_zero_usage: &[String]) -> Self {
        let meter = |metric, aggregation, rate, hourly| -> Arc<dyn ConsumptionSource> {
            Arc::new(MeterSource {
                metering: metering.clone(),
                metric,
                aggregation,
                rate,
                hourly,
            })
        };

        let mut sources: HashMap<String, Arc<dyn ConsumptionSource>> = HashMap::from([
            (
                "CPU_consumption".to_string(),
                meter("vcpus", SeriesAggregation::Sum, 1.0, true),
            ),
            (
                "RAM_consumption".to_string(),
                meter("memory", SeriesAggregation::Sum, 1024.0, true),
            ),
            (
                "Storage_consumption".to_string(),
                meter("volume.size", SeriesAggregation::Sum, 1.0, true),
            ),
            (
                "Floating_IP_consumption".to_string(),
                meter("ip.floating", SeriesAggregation::Count, 1.0, true),
            ),
            (
                "LB_consumption".to_string(),
                meter(
                    "network.services.lb.loadbalancer",
                    SeriesAggregation::Count,
                    1.0,
                    false,
                ),
            ),
            (
                "K8S_consumption".to_string(),
                meter("magnum.cluster", SeriesAggregation::Count, 1.0, true),
            ),
            (
                "Outgoing_Traffic_consumption".to_string(),
                Arc::new(TrafficSource {
                    metering: metering.clone(),
                }),
            ),
        ]);
        for mpn in report_zero_usage {
            sources.insert(mpn.clone(), Arc::new(ZeroSource));
        }

        Self { sources }
    }

    /// Catalog with an explicit source set, bypassing the metering
    /// defaults.
    pub fn from_sources(sources: HashMap<String, Arc<dyn ConsumptionSource>>) -> Self {
        Self { sources }
    }

    /// One usage record per known billable item of the asset. Items
    /// with no matching source are silently not reported.
    pub async fn collect_records(
        &self,
        items: &[BillableItem],
        project_id: &str,
        window: &UsageWindow,
    ) -> Result<Vec<UsageRecord>, ConnectorError> {
        let mut records = Vec::new();
        for item in items {
            let Some(source) = self.sources.get(&item.mpn) else {
                continue;
            };
            let quantity = source.collect(project_id, window).await?;
            info!(project_id, mpn = %item.mpn, quantity, "Collected consumption");
            records.push(UsageRecord::new(project_id, &item.mpn, quantity, window));
        }
        Ok(records)
    }
}
