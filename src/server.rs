use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::jobs::JobRegistry;
use crate::types::{HostTarget, JobState};

#[derive(Clone)]
pub struct AppState {
    registry: Arc<JobRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub hosts: Vec<HostTarget>,
}

/// Light progress view served to pollers; full records come from `/results`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusBody {
    pub job_id: String,
    pub total: usize,
    pub completed: usize,
    pub state: JobState,
    pub error: Option<String>,
}

pub async fn spawn_server(bind: &str, registry: Arc<JobRegistry>) -> Result<()> {
    let state = AppState { registry };

    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/status/{job_id}", get(get_status))
        .route("/results/{job_id}", get(get_results))
        .route("/jobs/{job_id}", delete(delete_job))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http());

    info!(%bind, "serving scan API");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> impl IntoResponse {
    // Malformed entries are a request error; an empty list is a valid request
    // that produces a Failed job.
    for h in &req.hosts {
        if h.domain.trim().is_empty() {
            return (StatusCode::BAD_REQUEST, "empty domain".to_string()).into_response();
        }
        if h.ip.parse::<IpAddr>().is_err() {
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid IP for {}: {}", h.domain, h.ip),
            )
                .into_response();
        }
    }

    let job_id = app.registry.submit(req.hosts).await;
    // Submit always registers the job, so the snapshot is present.
    match app.registry.poll(&job_id).await {
        Some(snap) => (
            StatusCode::ACCEPTED,
            Json(StatusBody {
                job_id: snap.job_id,
                total: snap.total,
                completed: snap.completed,
                state: snap.state,
                error: snap.error,
            }),
        )
            .into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_status(State(app): State<AppState>, Path(job_id): Path<String>) -> impl IntoResponse {
    match app.registry.poll(&job_id).await {
        Some(snap) => (
            StatusCode::OK,
            Json(StatusBody {
                job_id: snap.job_id,
                total: snap.total,
                completed: snap.completed,
                state: snap.state,
                error: snap.error,
            }),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_results(State(app): State<AppState>, Path(job_id): Path<String>) -> impl IntoResponse {
    match app.registry.poll(&job_id).await {
        Some(snap) => (StatusCode::OK, Json(snap)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_job(State(app): State<AppState>, Path(job_id): Path<String>) -> impl IntoResponse {
    if app.registry.evict(&job_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}
