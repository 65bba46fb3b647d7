// Metric samples, metrics API payloads and the external ingestion payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted metric name, in characters.
pub const MAX_METRIC_NAME_CHARS: usize = 100;

/// Immutable metric fact attached to a capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub tenant_id: Uuid,
    pub capacity_id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    pub aggregation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableName {
    pub value: String,
    #[serde(default)]
    pub localized_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub name: LocalizableName,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub primary_aggregation_type: Option<String>,
}

/// Metrics API response body (`value` holds one entry per requested metric).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub value: Vec<MetricEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: LocalizableName,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub data: Vec<MetricValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub time_stamp: DateTime<Utc>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub count: Option<f64>,
}

impl MetricValue {
    fn aggregations(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [
            ("Average", self.average),
            ("Total", self.total),
            ("Minimum", self.minimum),
            ("Maximum", self.maximum),
            ("Count", self.count),
        ]
        .into_iter()
        .filter_map(|(kind, v)| v.map(|v| (kind, v)))
    }
}

impl MetricSeries {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Flattens the series into samples: one per present aggregation per data point.
    pub fn into_samples(self, tenant_id: Uuid, capacity_id: Uuid) -> Vec<MetricSample> {
        let mut out = Vec::new();
        for entry in self.value {
            for series in &entry.timeseries {
                for point in &series.data {
                    for (kind, value) in point.aggregations() {
                        out.push(MetricSample {
                            tenant_id,
                            capacity_id,
                            collected_at: point.time_stamp,
                            metric_name: entry.name.value.clone(),
                            value,
                            aggregation: Some(kind.to_string()),
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub aggregation: Option<String>,
}

/// Metrics pushed by an external agent, addressed by capacity display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub capacity_name: String,
    pub metrics: Vec<MetricDataPoint>,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
}

impl IngestPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_name.trim().is_empty() {
            return Err("capacity_name must be non-empty".into());
        }
        if self.metrics.is_empty() {
            return Err("metrics must contain at least one data point".into());
        }
        for m in &self.metrics {
            let len = m.name.chars().count();
            if len == 0 || len > MAX_METRIC_NAME_CHARS {
                return Err(format!(
                    "metric name must be 1..={MAX_METRIC_NAME_CHARS} characters, got {len}"
                ));
            }
            if !m.value.is_finite() {
                return Err(format!("metric {} has a non-finite value", m.name));
            }
        }
        Ok(())
    }
}
