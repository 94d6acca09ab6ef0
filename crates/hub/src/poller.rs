//! Sensor history poller: fetches the analysis backend's `/graph` payload on
//! a fixed interval and publishes the parsed report into [`SharedState`].
//!
//! No backoff and no dedup of identical payloads. Overlapping fetches (a
//! manual refresh racing the timer) are resolved by the generation check in
//! [`DashboardState::finish_poll`](crate::state::DashboardState::finish_poll).

use std::time::Duration;

use time::UtcOffset;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::sensors::{parse_report, IngestError, SensorReport};
use crate::state::SharedState;
use crate::upstream::Upstream;

/// Handle to the spawned polling task.
pub struct Poller {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    shared: SharedState,
}

/// Start polling. The first fetch happens immediately.
pub fn spawn(upstream: Upstream, shared: SharedState, every: Duration, offset: UtcOffset) -> Poller {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let task_shared = shared.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_sec = every.as_secs(), "sensor poller started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }
            // Dropping the in-flight fetch is the cancellation.
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = poll_once(&upstream, &task_shared, offset) => {}
            }
        }

        info!("sensor poller stopped");
    });

    Poller {
        stop_tx: Some(stop_tx),
        task,
        shared,
    }
}

impl Poller {
    /// Stop the timer, cancel any in-flight fetch and close the state so
    /// late results are discarded.
    pub async fn shutdown(mut self) {
        self.shared.write().await.close();
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "sensor poller task ended abnormally");
        }
    }
}

/// Run one fetch-parse-publish cycle. Returns whether the result was
/// applied.
pub async fn poll_once(upstream: &Upstream, shared: &SharedState, offset: UtcOffset) -> bool {
    let Some(generation) = shared.write().await.begin_poll() else {
        return false;
    };

    let outcome = fetch_report(upstream, offset).await;
    match &outcome {
        Ok(report) => info!(
            generation,
            entries = report.history.humidity.len(),
            "sensor history refreshed"
        ),
        Err(e) => warn!(generation, error = %e, "sensor history refresh failed"),
    }

    shared
        .write()
        .await
        .finish_poll(generation, outcome.map_err(|e| e.to_string()))
}

async fn fetch_report(upstream: &Upstream, offset: UtcOffset) -> Result<SensorReport, IngestError> {
    let payload = upstream.fetch_graph().await?;
    parse_report(payload, offset)
}

// ===========================================================================
// Tests
// ===========================================================================
