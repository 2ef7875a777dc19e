// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(InputError::UnknownKind(other.to_string())),
        }
    }
}

/// A typed sample: a gauge replaces, a counter adds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Rejects what the stores cannot hold: an empty id or a gauge that is
    /// NaN or infinite.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.name.is_empty() {
            return Err(InputError::EmptyId);
        }
        match self.value {
            MetricValue::Gauge(v) => finite_gauge(v, &v.to_string()).map(|_| ()),
            MetricValue::Counter(_) => Ok(()),
        }
    }

    /// Builds a metric from the three textual parts of a path-style update,
    /// e.g. `counter`, `PollCount`, `3`.
    pub fn parse(kind: &str, name: &str, value: &str) -> Result<Self, InputError> {
        let kind = MetricKind::from_str(kind)?;
        if name.is_empty() {
            return Err(InputError::EmptyId);
        }
        let value = match kind {
            MetricKind::Gauge => match value.parse::<f64>() {
                Ok(v) => finite_gauge(v, value)?,
                Err(_) => {
                    return Err(InputError::InvalidValue {
                        kind: "gauge",
                        value: value.to_string(),
                    })
                }
            },
            MetricKind::Counter => value
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| InputError::InvalidValue {
                    kind: "counter",
                    value: value.to_string(),
                })?,
        };
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// JSON has no encoding for NaN or infinity, so such gauges never enter a store.
fn finite_gauge(v: f64, raw: &str) -> Result<MetricValue, InputError> {
    if v.is_finite() {
        Ok(MetricValue::Gauge(v))
    } else {
        Err(InputError::InvalidValue {
            kind: "gauge",
            value: raw.to_string(),
        })
    }
}

/// Wire form of a metric, shared by the update endpoints and the snapshot file.
///
/// Exactly one of `delta` and `value` is present, depending on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    /// A record that only names a metric, as sent to the value lookup endpoint.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }
}

impl From<&Metric> for MetricRecord {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Self {
            id: metric.name.clone(),
            kind: metric.kind(),
            delta,
            value,
        }
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        MetricRecord::from(&metric)
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = InputError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        if record.id.is_empty() {
            return Err(InputError::EmptyId);
        }
        let value = match record.kind {
            MetricKind::Gauge => {
                let v = record
                    .value
                    .ok_or_else(|| InputError::MissingValue(record.id.clone()))?;
                finite_gauge(v, &v.to_string())?
            }
            MetricKind::Counter => MetricValue::Counter(
                record
                    .delta
                    .ok_or_else(|| InputError::MissingDelta(record.id.clone()))?,
            ),
        };
        Ok(Metric {
            name: record.id,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gauge_record_shape() {
        let record = MetricRecord::from(Metric::gauge("temp", 21.5));
        let encoded = serde_json::to_value(&record).expect("serialize");
        assert_eq!(encoded, json!({"id": "temp", "type": "gauge", "value": 21.5}));
    }

    #[test]
    fn test_counter_record_shape() {
        let record = MetricRecord::from(Metric::counter("PollCount", 4));
        let encoded = serde_json::to_value(&record).expect("serialize");
        assert_eq!(encoded, json!({"id": "PollCount", "type": "counter", "delta": 4}));
    }

    #[test]
    fn test_unknown_type_is_rejected_by_decoder() {
        let decoded = serde_json::from_str::<MetricRecord>(r#"{"id":"x","type":"histogram"}"#);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_counter_without_delta_is_malformed() {
        let record: MetricRecord =
            serde_json::from_str(r#"{"id":"requests","type":"counter","value":1.0}"#)
                .expect("decode");
        assert_eq!(
            Metric::try_from(record),
            Err(InputError::MissingDelta("requests".into()))
        );
    }

    #[test]
    fn test_gauge_without_value_is_malformed() {
        let record = MetricRecord::query("temp", MetricKind::Gauge);
        assert_eq!(
            Metric::try_from(record),
            Err(InputError::MissingValue("temp".into()))
        );
    }

    #[test]
    fn test_empty_id_is_rejected() {
        let record = MetricRecord {
            id: String::new(),
            kind: MetricKind::Counter,
            delta: Some(1),
            value: None,
        };
        assert_eq!(Metric::try_from(record), Err(InputError::EmptyId));
    }

    #[test]
    fn test_parse_path_update() {
        assert_eq!(
            Metric::parse("counter", "PollCount", "3"),
            Ok(Metric::counter("PollCount", 3))
        );
        assert_eq!(
            Metric::parse("gauge", "Alloc", "1.25"),
            Ok(Metric::gauge("Alloc", 1.25))
        );
        assert!(matches!(
            Metric::parse("counter", "PollCount", "1.5"),
            Err(InputError::InvalidValue { kind: "counter", .. })
        ));
        assert!(matches!(
            Metric::parse("summary", "x", "1"),
            Err(InputError::UnknownKind(_))
        ));
        assert_eq!(Metric::parse("gauge", "", "1"), Err(InputError::EmptyId));
    }

    #[test]
    fn test_non_finite_gauge_is_rejected() {
        for raw in ["NaN", "inf", "-inf", "infinity"] {
            assert_eq!(
                Metric::parse("gauge", "temp", raw),
                Err(InputError::InvalidValue {
                    kind: "gauge",
                    value: raw.to_string(),
                }),
                "{raw}"
            );
        }

        let record = MetricRecord::from(Metric::gauge("temp", f64::NAN));
        assert!(matches!(
            Metric::try_from(record),
            Err(InputError::InvalidValue { kind: "gauge", .. })
        ));

        assert!(Metric::gauge("temp", f64::NEG_INFINITY).validate().is_err());
        assert!(Metric::gauge("temp", 21.5).validate().is_ok());
        assert_eq!(Metric::counter("", 1).validate(), Err(InputError::EmptyId));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(MetricValue::Gauge(21.5).to_string(), "21.5");
        assert_eq!(MetricValue::Counter(8).to_string(), "8");
    }
}
