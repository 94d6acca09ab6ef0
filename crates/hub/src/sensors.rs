//! Sensor history ingest: turns the analysis backend's `/graph` payload (a
//! loosely-typed, newest-first JSON array) into a typed report.
//!
//! Default substitution is asymmetric: a missing leaf value is
//! `0` in the chart series but `None` in the current snapshot, so status
//! cards can show "unknown" instead of a fake zero.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::tips::Conditions;

/// Label used when an entry's timestamp is missing or unparseable.
pub const INVALID_TIME_LABEL: &str = "Invalid Date";

/// Comfort bands (inclusive) used for the status-card indicators.
const AIR_HUMIDITY_BAND: (f64, f64) = (45.0, 65.0);
const SOIL_MOISTURE_BAND: (f64, f64) = (40.0, 70.0);
const TEMPERATURE_BAND: (f64, f64) = (20.0, 26.0);

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to fetch sensor history: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("expected a JSON array of sensor entries, got {0}")]
    NotArray(&'static str),
    #[error("sensor history is empty")]
    Empty,
    #[error("sensor entry {index} is malformed: {source}")]
    Entry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Upstream schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    humidity: Option<RawMeasure>,
    #[serde(default, deserialize_with = "lenient")]
    soil: Option<RawSoil>,
    #[serde(default, deserialize_with = "lenient")]
    temperature: Option<RawMeasure>,
    #[serde(rename = "Sensor Analysis", default, deserialize_with = "lenient")]
    analysis: Option<RawSensorAnalysis>,
}

#[derive(Debug, Deserialize)]
struct RawMeasure {
    #[serde(default, deserialize_with = "number")]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSoil {
    #[serde(default, deserialize_with = "number")]
    percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSensorAnalysis {
    #[serde(rename = "Air Temperature", default, deserialize_with = "lenient")]
    air_temperature: Option<RawAdvice>,
    #[serde(rename = "Relative Humidity", default, deserialize_with = "lenient")]
    relative_humidity: Option<RawAdvice>,
    #[serde(rename = "Soil Moisture", default, deserialize_with = "lenient")]
    soil_moisture: Option<RawAdvice>,
}

#[derive(Debug, Deserialize)]
struct RawAdvice {
    #[serde(default, deserialize_with = "text")]
    tip: Option<String>,
}

/// Nested objects of the wrong shape count as absent rather than failing
/// the whole entry.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(de)?;
    Ok(serde_json::from_value(value).ok())
}

fn number<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(de)?.as_f64())
}

fn text<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Typed report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub air_humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorHistory {
    pub humidity: Vec<SeriesPoint>,
    pub soil: Vec<SeriesPoint>,
    pub temperature: Vec<SeriesPoint>,
}

/// Free-text advice the backend attached to the newest entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorAdvice {
    pub temperature: String,
    pub humidity: String,
    pub soil: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub current: SensorSnapshot,
    pub history: SensorHistory,
    pub advice: SensorAdvice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Unknown,
    Ok,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusIndicators {
    pub air_humidity: Indicator,
    pub soil_moisture: Indicator,
    pub temperature: Indicator,
}

impl SensorSnapshot {
    /// Readings for the tip engine, available only when all three are known.
    pub fn conditions(&self) -> Option<Conditions> {
        Some(Conditions {
            air_humidity: self.air_humidity?,
            soil_moisture: self.soil_moisture?,
            temperature: self.temperature?,
        })
    }

    pub fn indicators(&self) -> StatusIndicators {
        StatusIndicators {
            air_humidity: indicator(self.air_humidity, AIR_HUMIDITY_BAND),
            soil_moisture: indicator(self.soil_moisture, SOIL_MOISTURE_BAND),
            temperature: indicator(self.temperature, TEMPERATURE_BAND),
        }
    }
}

fn indicator(value: Option<f64>, (low, high): (f64, f64)) -> Indicator {
    match value {
        None => Indicator::Unknown,
        Some(v) if v < low || v > high => Indicator::Warning,
        Some(_) => Indicator::Ok,
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Build a report from the raw `/graph` payload.
///
/// Index 0 is taken as the current reading: the backend sorts by
/// `timestamp` descending.
pub fn parse_report(payload: Value, offset: UtcOffset) -> Result<SensorReport, IngestError> {
    let items = match payload {
        Value::Array(items) => items,
        other => return Err(IngestError::NotArray(value_kind(&other))),
    };
    if items.is_empty() {
        return Err(IngestError::Empty);
    }

    let entries = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<RawEntry>(item)
                .map_err(|source| IngestError::Entry { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut history = SensorHistory::default();
    for entry in &entries {
        let time = time_label(entry.timestamp.as_ref(), offset);
        history.humidity.push(SeriesPoint {
            time: time.clone(),
            value: entry.humidity_value().unwrap_or(0.0),
        });
        history.soil.push(SeriesPoint {
            time: time.clone(),
            value: entry.soil_percent().unwrap_or(0.0),
        });
        history.temperature.push(SeriesPoint {
            time,
            value: entry.temperature_value().unwrap_or(0.0),
        });
    }

    let newest = &entries[0];
    let current = SensorSnapshot {
        air_humidity: newest.humidity_value(),
        soil_moisture: newest.soil_percent(),
        temperature: newest.temperature_value(),
    };

    let tip = |advice: Option<&RawAdvice>| {
        advice
            .and_then(|a| a.tip.clone())
            .unwrap_or_default()
    };
    let analysis = newest.analysis.as_ref();
    let advice = SensorAdvice {
        temperature: tip(analysis.and_then(|a| a.air_temperature.as_ref())),
        humidity: tip(analysis.and_then(|a| a.relative_humidity.as_ref())),
        soil: tip(analysis.and_then(|a| a.soil_moisture.as_ref())),
    };

    Ok(SensorReport {
        current,
        history,
        advice,
    })
}

impl RawEntry {
    fn humidity_value(&self) -> Option<f64> {
        self.humidity.as_ref().and_then(|m| m.value)
    }

    fn soil_percent(&self) -> Option<f64> {
        self.soil.as_ref().and_then(|s| s.percent)
    }

    fn temperature_value(&self) -> Option<f64> {
        self.temperature.as_ref().and_then(|m| m.value)
    }
}

/// Render an entry timestamp as `HH:MM` in the display offset.
///
/// Accepts RFC 3339, RFC 2822 (Flask's default datetime encoding), naive
/// ISO 8601 (read as display-local time) and epoch milliseconds.
pub fn time_label(timestamp: Option<&Value>, offset: UtcOffset) -> String {
    let format = format_description!("[hour]:[minute]");
    timestamp
        .and_then(|ts| parse_timestamp(ts, offset))
        .and_then(|instant| instant.to_offset(offset).format(&format).ok())
        .unwrap_or_else(|| INVALID_TIME_LABEL.to_string())
}

fn parse_timestamp(ts: &Value, offset: UtcOffset) -> Option<OffsetDateTime> {
    match ts {
        Value::String(s) => {
            let s = s.trim();
            OffsetDateTime::parse(s, &Rfc3339)
                .or_else(|_| OffsetDateTime::parse(s, &Rfc2822))
                .ok()
                .or_else(|| {
                    PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
                        .ok()
                        .map(|naive| naive.assume_offset(offset))
                })
        }
        Value::Number(n) => {
            let millis = n.as_f64()?;
            OffsetDateTime::from_unix_timestamp_nanos((millis * 1_000_000.0) as i128).ok()
        }
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ===========================================================================
// Tests
// ===========================================================================
