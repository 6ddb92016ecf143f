use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::round_to;

/// Ticker or other stable key identifying one security.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(pub String);

impl SecurityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Value semantics of a metric, used when presenting raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Ratio,
    Percentage,
    Currency,
    Integer,
    Score,
}

impl ValueKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ratio" => Some(Self::Ratio),
            "percentage" | "percent" => Some(Self::Percentage),
            "currency" => Some(Self::Currency),
            "integer" => Some(Self::Integer),
            "score" => Some(Self::Score),
            _ => None,
        }
    }

    pub fn format(self, value: f64) -> String {
        match self {
            ValueKind::Ratio => format!("{value:.2}x"),
            ValueKind::Percentage => format!("{value:.1}%"),
            ValueKind::Currency => format_currency(value),
            ValueKind::Integer => format!("{value:.0}"),
            ValueKind::Score => format!("{value:.2}"),
        }
    }
}

fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();
    let (scaled, suffix) = if magnitude >= 1e12 {
        (magnitude / 1e12, "T")
    } else if magnitude >= 1e9 {
        (magnitude / 1e9, "B")
    } else if magnitude >= 1e6 {
        (magnitude / 1e6, "M")
    } else {
        (magnitude, "")
    };
    format!("{sign}${scaled:.2}{suffix}")
}

/// Reference data describing one metric, shared by every factor that scores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    pub id: String,
    pub value_kind: ValueKind,
    pub higher_is_better: bool,
    pub category: String,
}

/// A single stored value in a metrics snapshot. Only finite numbers resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Absent,
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetricValue::Absent, MetricValue::Number)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Flag(value)
    }
}

pub const PRICE_PATH: &str = "quote.price";
pub const TARGET_MEAN_PATH: &str = "analyst.target_mean";
pub const RATING_PATH: &str = "analyst.rating";
pub const UPSIDE_PATH: &str = "analyst.upside_pct";
pub const RATING_SCORE_PATH: &str = "analyst.rating_score";

/// Flat, sparse snapshot of one security's metrics keyed by dotted source path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub security_id: SecurityId,
    #[serde(default)]
    values: BTreeMap<String, MetricValue>,
}

impl SecurityMetrics {
    pub fn new(security_id: SecurityId) -> Self {
        Self {
            security_id,
            values: BTreeMap::new(),
        }
    }

    /// Flatten a nested JSON document into dotted paths (`{"a":{"b":1}}` -> `a.b`).
    /// Arrays carry no metric semantics and are skipped.
    pub fn from_nested(security_id: SecurityId, document: &Value) -> Self {
        let mut metrics = Self::new(security_id);
        flatten_into(&mut metrics.values, None, document);
        metrics
    }

    pub fn with_value(mut self, path: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<MetricValue>) {
        self.values.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&MetricValue> {
        self.values.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fill `analyst.upside_pct` and `analyst.rating_score` from the raw analyst
    /// consensus fields. Paths that already resolve are left untouched.
    pub fn derive_analyst_fields(&mut self) {
        if resolve(self, UPSIDE_PATH).is_none() {
            let target = resolve(self, TARGET_MEAN_PATH).filter(|target| *target != 0.0);
            let price = resolve(self, PRICE_PATH).filter(|price| *price > 0.0);
            if let (Some(target), Some(price)) = (target, price) {
                self.insert(UPSIDE_PATH, round_to((target / price - 1.0) * 100.0, 2));
            }
        }

        if resolve(self, RATING_SCORE_PATH).is_none() {
            // Consensus ratings arrive as "1.9 - Buy" on a 1 (strong buy) to 5 scale.
            let consensus = match self.get(RATING_PATH) {
                Some(MetricValue::Text(text)) => text
                    .split_whitespace()
                    .next()
                    .and_then(|lead| lead.parse::<f64>().ok()),
                Some(value) => value.as_number(),
                None => None,
            };
            if let Some(consensus) = consensus.filter(|value| value.is_finite()) {
                self.insert(RATING_SCORE_PATH, round_to(6.0 - consensus, 2));
            }
        }
    }
}

fn flatten_into(values: &mut BTreeMap<String, MetricValue>, prefix: Option<&str>, node: &Value) {
    let leaf = match node {
        Value::Object(map) => {
            for (key, child) in map {
                let path = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_into(values, Some(&path), child);
            }
            return;
        }
        Value::Array(_) => return,
        Value::Null => MetricValue::Absent,
        Value::Bool(flag) => MetricValue::Flag(*flag),
        Value::Number(number) => number.as_f64().map_or(MetricValue::Absent, MetricValue::Number),
        Value::String(text) => MetricValue::Text(text.clone()),
    };

    if let Some(path) = prefix {
        values.insert(path.to_string(), leaf);
    }
}

/// Resolve a dotted source path to a usable number. Absent paths, non-numeric
/// values, NaN and infinities all resolve to `None`.
pub fn resolve(metrics: &SecurityMetrics, source_path: &str) -> Option<f64> {
    metrics.get(source_path).and_then(MetricValue::as_number)
}

/// Collaborator that supplies metric snapshots, typically backed by a data provider.
pub trait MetricsSource: Send + Sync {
    fn security_metrics(&self, security_id: &SecurityId) -> Result<SecurityMetrics, SourceError>;
}

/// Failure reported by a [`MetricsSource`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("no metrics available for security {0}")]
    NotFound(SecurityId),
    #[error("metrics source unavailable: {0}")]
    Unavailable(String),
}
