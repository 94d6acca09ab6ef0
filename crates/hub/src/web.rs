use anyhow::Context;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use time::UtcOffset;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analysis::{self, AnalysisError, GrowthAnalysis};
use crate::config::ServerConfig;
use crate::poller;
use crate::relay::{self, RelayError};
use crate::state::SharedState;
use crate::tips::{group_tips, GroupedTips, TipFilter};
use crate::upstream::Upstream;

/// Everything a request handler may touch. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub upstream: Upstream,
    pub offset: UtcOffset,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Relay(e) => e.into_response(),
            ApiError::Analysis(e) => e.into_response(),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(app: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // Relays
        .route("/photo-relay", get(relay::photo))
        .route("/graph-relay", get(relay::graph))
        .route("/sensor-relay", get(relay::sensor))
        .route("/capture-submit", get(relay::capture))
        .route(
            "/upload-relay",
            post(relay::upload).fallback(relay::method_not_allowed),
        )
        // Typed dashboard API
        .route("/api/health", get(api_health))
        .route("/api/dashboard", get(api_dashboard))
        .route("/api/tips", get(api_tips))
        .route("/api/refresh", post(api_refresh))
        .route("/api/analysis", post(api_analysis_upload))
        .route("/api/analysis/capture", post(api_analysis_capture))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn api_health(State(app): State<AppState>) -> impl IntoResponse {
    let uptime_secs = app.shared.read().await.started_at.elapsed().as_secs();
    Json(json!({ "status": "ok", "uptime_secs": uptime_secs }))
}

async fn api_dashboard(State(app): State<AppState>) -> impl IntoResponse {
    let st = app.shared.read().await;
    Json(st.to_response())
}

#[derive(Deserialize)]
struct TipsQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct TipsResponse {
    category: String,
    #[serde(flatten)]
    tips: GroupedTips,
}

async fn api_tips(
    State(app): State<AppState>,
    Query(query): Query<TipsQuery>,
) -> Result<Json<TipsResponse>, ApiError> {
    let filter = query
        .category
        .as_deref()
        .unwrap_or("all")
        .parse::<TipFilter>()
        .map_err(ApiError::BadRequest)?;

    let tips = app.shared.read().await.tips();
    Ok(Json(TipsResponse {
        category: filter.to_string(),
        tips: group_tips(&tips, filter),
    }))
}

async fn api_refresh(State(app): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async move {
        poller::poll_once(&app.upstream, &app.shared, app.offset).await;
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "refreshing" })))
}

async fn api_analysis_upload(
    State(app): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GrowthAnalysis>, ApiError> {
    let mut multipart = relay::form(multipart)?;
    let image = relay::read_image(&mut multipart).await?;
    let analysis = analysis::analyze_upload(&app.upstream, image).await?;
    Ok(Json(analysis))
}

async fn api_analysis_capture(
    State(app): State<AppState>,
) -> Result<Json<GrowthAnalysis>, ApiError> {
    let analysis = analysis::analyze_capture(&app.upstream).await?;
    Ok(Json(analysis))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(
    app: AppState,
    cfg: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {addr}"))?;

    info!(%addr, "dashboard api listening");

    axum::serve(listener, router(app, cfg.max_upload_bytes))
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server error")?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
