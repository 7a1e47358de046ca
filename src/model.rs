use std::collections::BTreeSet;
use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Identifier for a subscription or database.
///
/// The metrics API emits some ids as JSON numbers and others as strings, so both are accepted
/// and normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl From<RawId> for ResourceId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => Self(text),
            RawId::Integer(value) => Self(value.to_string()),
            RawId::Float(value) => Self(value.to_string()),
        }
    }
}

/// Observed values for one database. `None` means the metric is unavailable, which is
/// distinct from a zero reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSample {
    /// Operations per second.
    #[serde(deserialize_with = "number_or_none")]
    pub throughput: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub throughput_limit: Option<f64>,
    /// Used memory in bytes.
    #[serde(deserialize_with = "number_or_none")]
    pub memory: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub memory_limit_bytes: Option<f64>,
    /// Percent, 0-100.
    #[serde(deserialize_with = "number_or_none")]
    pub cpu: Option<f64>,
    /// Average latency in seconds. The field name is historical; comparison happens in ms.
    #[serde(deserialize_with = "number_or_none")]
    pub latency_ms: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub payload_size_bytes: Option<f64>,
}

/// Per-metric limits used to judge a sample.
///
/// Ratios are fractions of the paired limit; latency and payload size are absolute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    #[serde(deserialize_with = "number_or_none")]
    pub throughput_threshold: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub memory_threshold: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub cpu_threshold: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub latency_threshold_ms: Option<f64>,
    #[serde(deserialize_with = "number_or_none")]
    pub payload_size_threshold_kb: Option<f64>,
}

/// Ceiling a database may be scaled up to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxScaling {
    pub memory_gb: f64,
    pub throughput_ops: f64,
}

/// One database row as served by `GET /api/metrics`.
///
/// Everything except `metrics` and `thresholds` is carried through for display only. Apart from
/// the ids, a malformed field decodes as absent instead of rejecting the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub database_id: ResourceId,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub database_name: String,
    pub subscription_id: ResourceId,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub subscription_name: String,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub metrics: MetricSample,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub thresholds: ThresholdPolicy,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub replication: Option<bool>,
    #[serde(default, deserialize_with = "default_if_invalid")]
    pub max_scaling: Option<MaxScaling>,
    #[serde(default, deserialize_with = "number_or_none")]
    pub price_hourly: Option<f64>,
    #[serde(default, deserialize_with = "number_or_none")]
    pub min_subscription_price: Option<f64>,
    #[serde(default, deserialize_with = "number_or_none")]
    pub downscale_throughput_ops: Option<f64>,
    #[serde(default, deserialize_with = "number_or_none")]
    pub downscale_memory_mb: Option<f64>,
    #[serde(default)]
    pub downscale_price_suggestion: Option<serde_json::Value>,
}

/// Body of `GET /api/metrics`; older backends return a bare array. Rows without usable ids
/// are dropped with a warning.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    Wrapped {
        #[serde(deserialize_with = "usable_records")]
        databases: Vec<DatabaseRecord>,
        #[serde(default = "default_true")]
        prometheus_available: bool,
    },
    Bare(#[serde(deserialize_with = "usable_records")] Vec<DatabaseRecord>),
}

fn default_true() -> bool {
    true
}

/// Finite numbers, and strings holding one, decode as `Some`; anything else is `None`.
fn number_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

fn default_if_invalid<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn usable_records<'de, D>(deserializer: D) -> Result<Vec<DatabaseRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = Vec::<Value>::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable database row");
                None
            }
        })
        .collect())
}

impl MetricsPayload {
    /// Split into the database rows and the live-metrics availability flag.
    pub fn into_parts(self) -> (Vec<DatabaseRecord>, bool) {
        match self {
            MetricsPayload::Wrapped {
                databases,
                prometheus_available,
            } => (databases, prometheus_available),
            MetricsPayload::Bare(databases) => (databases, true),
        }
    }
}

/// Window the metrics API aggregates over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeRange {
    Relative { period: String },
    Absolute { from: String, to: String },
}

impl TimeRange {
    pub fn relative(period: impl Into<String>) -> Self {
        TimeRange::Relative {
            period: period.into(),
        }
    }

    /// Query parameters for `GET /api/metrics`. An incomplete absolute range yields none, which
    /// lets the backend fall back to its own default period.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            TimeRange::Relative { period } if !period.is_empty() => {
                vec![("period", period.clone())]
            }
            TimeRange::Relative { .. } => Vec::new(),
            TimeRange::Absolute { from, to } if !from.is_empty() && !to.is_empty() => {
                vec![("abs_from", from.clone()), ("abs_to", to.clone())]
            }
            TimeRange::Absolute { .. } => Vec::new(),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::relative("5m")
    }
}

/// (subscription, database) pair addressed by the autoscale toggle endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AutoscaleTarget {
    pub subscription_id: ResourceId,
    pub database_id: ResourceId,
}

/// Set of databases with autoscaling switched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoscaleRegistry {
    enabled: BTreeSet<(ResourceId, ResourceId)>,
}

impl AutoscaleRegistry {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ResourceId, ResourceId)>,
    {
        Self {
            enabled: pairs.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self, subscription_id: &ResourceId, database_id: &ResourceId) -> bool {
        self.enabled
            .contains(&(subscription_id.clone(), database_id.clone()))
    }

    pub fn set(&mut self, target: &AutoscaleTarget, enabled: bool) {
        let key = (target.subscription_id.clone(), target.database_id.clone());
        if enabled {
            self.enabled.insert(key);
        } else {
            self.enabled.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}
