use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use crate::sensors::{SensorAdvice, SensorHistory, SensorReport, SensorSnapshot, StatusIndicators};
use crate::tips::{care_tips, CareTip};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<DashboardState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Latest polled view of the plant, owned by the poller.
///
/// Every fetch takes a generation number when it starts. A result is applied
/// only if its generation is newer than the one currently shown, so a slow
/// fetch can never overwrite a faster, later one. Once closed, nothing is
/// applied.
pub struct DashboardState {
    pub started_at: Instant,
    issued: u64,
    applied: u64,
    closed: bool,
    report: Option<SensorReport>,
    updated_at: Option<OffsetDateTime>,
    last_error: Option<String>,
    events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Poll,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct DashboardResponse {
    pub uptime_secs: u64,
    pub generation: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub current: SensorSnapshot,
    pub indicators: StatusIndicators,
    pub history: SensorHistory,
    pub advice: SensorAdvice,
    pub tips: Vec<CareTip>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            issued: 0,
            applied: 0,
            closed: false,
            report: None,
            updated_at: None,
            last_error: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Reserve a generation for a fetch about to start. `None` once closed.
    pub fn begin_poll(&mut self) -> Option<u64> {
        if self.closed {
            return None;
        }
        self.issued += 1;
        Some(self.issued)
    }

    /// Apply the outcome of fetch `generation`. Returns `false` when the
    /// result was stale (or the state is closed) and got discarded.
    ///
    /// A failed fetch keeps the previous report on display.
    pub fn finish_poll(&mut self, generation: u64, outcome: Result<SensorReport, String>) -> bool {
        if self.closed || generation <= self.applied {
            debug!(generation, applied = self.applied, "discarding stale poll result");
            return false;
        }
        self.applied = generation;

        match outcome {
            Ok(report) => {
                let detail = format!(
                    "generation {generation}: {} entr{}",
                    report.history.humidity.len(),
                    if report.history.humidity.len() == 1 { "y" } else { "ies" }
                );
                self.report = Some(report);
                self.updated_at = Some(OffsetDateTime::now_utc());
                self.last_error = None;
                self.push_event(EventKind::Poll, detail);
            }
            Err(e) => {
                self.last_error = Some(e.clone());
                self.push_event(EventKind::Error, format!("generation {generation}: {e}"));
            }
        }
        true
    }

    /// Stop accepting results. In-flight fetches finish into the void.
    pub fn close(&mut self) {
        self.closed = true;
        self.push_event(EventKind::System, "poller stopped".to_string());
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    pub fn current(&self) -> SensorSnapshot {
        self.report
            .as_ref()
            .map(|r| r.current)
            .unwrap_or_default()
    }

    /// Care tips for the current snapshot; empty until all three readings
    /// are known.
    pub fn tips(&self) -> Vec<CareTip> {
        self.current()
            .conditions()
            .map(|c| care_tips(&c))
            .unwrap_or_default()
    }

    /// Build the JSON-serialisable dashboard view.
    pub fn to_response(&self) -> DashboardResponse {
        let current = self.current();
        let (history, advice) = match &self.report {
            Some(r) => (r.history.clone(), r.advice.clone()),
            None => Default::default(),
        };

        DashboardResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            generation: self.applied,
            updated_at: self.updated_at,
            last_error: self.last_error.clone(),
            current,
            indicators: current.indicators(),
            history,
            advice,
            tips: self.tips(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
