//! Growth analysis ingest: validates the analysis backend's JSON verdict on
//! a plant photo and normalizes it into typed sections.
//!
//! Transport failures and malformed verdicts are distinct internally (and in
//! the logs) but collapse into a single user-facing message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::upstream::{ImageUpload, Upstream};

/// The only failure text users ever see, whatever went wrong.
pub const FAILURE_MESSAGE: &str = "Please upload a new, clear photo of your plant and try again.";

const STATUS_SUMMARY: &str = "Current Status Summary";
const EXPERT_OBSERVATION: &str = "Expert Observation";
const HEALTH_SCORE: &str = "Health Score";
const RECOMMENDATION: &str = "Recommendation";
const SENSOR_ANALYSIS: &str = "Sensor Analysis";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analysis response is missing '{0}'")]
    Malformed(&'static str),
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        warn!(error = %self, "growth analysis failed");
        let body = Json(json!({
            "error": "analysis failed",
            "message": FAILURE_MESSAGE,
        }));
        (StatusCode::BAD_GATEWAY, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthAnalysis {
    pub status_summary: String,
    pub expert_observation: Option<String>,
    pub health_score: HealthScore,
    pub recommendation: Option<String>,
    /// In the order the backend listed the metrics.
    pub sensor_analysis: Vec<MetricAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    /// Nominally 0-10; passed through as reported.
    pub score: Option<f64>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAssessment {
    pub metric: String,
    pub status: String,
    pub interpretation: String,
    pub tip: String,
    /// First number found in `interpretation`, 0 if none.
    pub reading: f64,
    /// Progress-bar fill, one of 30/40/50/60/80.
    pub percentage: u8,
    pub color: StatusColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Amber,
    Red,
}

impl StatusColor {
    pub fn from_status(status: &str) -> Self {
        match status {
            "within range" => StatusColor::Green,
            "high" => StatusColor::Amber,
            _ => StatusColor::Red,
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Analyze a photo the user uploaded.
pub async fn analyze_upload(
    upstream: &Upstream,
    image: ImageUpload,
) -> Result<GrowthAnalysis, AnalysisError> {
    let verdict = upstream.submit_upload(image).await?;
    normalize(&verdict)
}

/// Analyze the frame the device captured most recently.
pub async fn analyze_capture(upstream: &Upstream) -> Result<GrowthAnalysis, AnalysisError> {
    let verdict = upstream.submit_capture().await?;
    normalize(&verdict)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Validate and normalize a verdict. The summary, health score and sensor
/// analysis must be present and non-empty; everything else is optional.
pub fn normalize(verdict: &Value) -> Result<GrowthAnalysis, AnalysisError> {
    for key in [STATUS_SUMMARY, HEALTH_SCORE, SENSOR_ANALYSIS] {
        if !verdict.get(key).is_some_and(is_present) {
            return Err(AnalysisError::Malformed(key));
        }
    }

    let metrics = verdict
        .get(SENSOR_ANALYSIS)
        .and_then(Value::as_object)
        .ok_or(AnalysisError::Malformed(SENSOR_ANALYSIS))?;

    Ok(GrowthAnalysis {
        status_summary: text(verdict.get(STATUS_SUMMARY)),
        expert_observation: optional_text(verdict.get(EXPERT_OBSERVATION)),
        health_score: health_score(verdict.get(HEALTH_SCORE)),
        recommendation: optional_text(verdict.get(RECOMMENDATION)),
        sensor_analysis: assess_metrics(metrics),
    })
}

/// Empty strings, zero, false and null all count as missing.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(|v| text(Some(v)))
}

fn health_score(value: Option<&Value>) -> HealthScore {
    let score = value.and_then(|v| v.get("score")).and_then(|s| match s {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    HealthScore {
        score,
        summary: text(value.and_then(|v| v.get("summary"))),
    }
}

fn assess_metrics(metrics: &Map<String, Value>) -> Vec<MetricAssessment> {
    metrics
        .iter()
        .map(|(metric, detail)| {
            let status = text(detail.get("status"));
            let interpretation = text(detail.get("interpretation"));
            let reading = extract_reading(&interpretation);
            MetricAssessment {
                metric: metric.clone(),
                percentage: bucket_percentage(metric, reading, &status),
                color: StatusColor::from_status(&status),
                tip: text(detail.get("tip")),
                status,
                interpretation,
                reading,
            }
        })
        .collect()
}

/// First unsigned decimal (`digits[.digits]`) embedded in `text`, or 0.
pub fn extract_reading(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let Some(start) = bytes.iter().position(u8::is_ascii_digit) else {
        return 0.0;
    };

    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    text[start..end].parse().unwrap_or(0.0)
}

/// Map a metric reading to a progress-bar percentage.
pub fn bucket_percentage(metric: &str, reading: f64, status: &str) -> u8 {
    let metric = metric.to_lowercase();
    if metric.contains("temperature") {
        if reading < 20.0 {
            30
        } else if reading > 32.0 {
            50
        } else {
            80
        }
    } else if metric.contains("humidity") {
        if reading < 40.0 {
            40
        } else if reading > 70.0 {
            60
        } else {
            80
        }
    } else if metric.contains("moisture") {
        if reading < 30.0 {
            40
        } else if reading > 60.0 {
            50
        } else {
            80
        }
    } else {
        match status {
            "within range" => 80,
            "high" => 60,
            _ => 40,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
