mod analysis;
mod config;
mod poller;
mod relay;
mod sensors;
mod state;
mod tips;
mod upstream;
mod web;

use anyhow::{Context, Result};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use state::DashboardState;
use upstream::Upstream;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("basil_hub=info,tower_http=info")),
        )
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").ok();
    let mut cfg = match config_path.as_deref() {
        Some(path) => config::load(path)?,
        None => config::load_or_default("config.toml")?,
    };

    if let Ok(raw) = env::var("WEB_PORT") {
        match raw.parse() {
            Ok(port) => cfg.server.port = port,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid WEB_PORT"),
        }
    }
    cfg.validate().context("invalid configuration")?;
    let offset = cfg.display.offset()?;

    info!(
        device = %cfg.upstream.device_url,
        analysis = %cfg.upstream.analysis_url,
        "upstreams configured"
    );

    // ── Shared state (ephemeral, for the dashboard) ─────────────────
    let upstream = Upstream::new(&cfg.upstream)?;
    let shared = Arc::new(RwLock::new(DashboardState::new()));
    shared.write().await.record_system("hub started".to_string());

    // ── Poller ──────────────────────────────────────────────────────
    let poller = poller::spawn(
        upstream.clone(),
        Arc::clone(&shared),
        Duration::from_secs(cfg.polling.interval_sec),
        offset,
    );

    // ── Web server ──────────────────────────────────────────────────
    let app = AppState {
        shared: Arc::clone(&shared),
        upstream,
        offset,
    };
    let served = web::serve(app, &cfg.server, shutdown_signal()).await;

    poller.shutdown().await;
    info!("hub stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
