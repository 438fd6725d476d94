//! HTTP API handlers for Sitepulse.
//!
//! - **GET /trigger_report**: starts a report job and returns its id at once.
//! - **POST /get_report**: reports `RUNNING`, `COMPLETE` (with a signed link)
//!   or `FAILED` for a job id. Unknown ids read as `RUNNING`.
//! - **GET /reports/:job_id/download**: serves a finished report to holders of
//!   a valid, unexpired link.
//! - **GET /health**: liveness.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::error::ArtifactError;
use crate::jobs::ReportJobs;
use crate::model::{DownloadQuery, ReportRequest, ReportStatus, TriggerResponse};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: ReportJobs,
}

/// All routes with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/trigger_report", get(trigger_report))
        .route("/get_report", post(get_report))
        .route("/reports/:job_id/download", get(download_report))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /trigger_report - Start a report job.
///
/// # Response
///
/// ```json
/// { "job_id": "2f6c0c1e-8a43-4a43-9d53-5d5b8a1b4f0e" }
/// ```
///
/// Always succeeds; the pipeline runs in the background.
#[instrument(skip(state))]
pub async fn trigger_report(State(state): State<AppState>) -> Json<TriggerResponse> {
    let job_id = state.jobs.trigger();
    Json(TriggerResponse { job_id })
}

/// POST /get_report - Check whether a report is ready.
///
/// # Request Body
///
/// ```json
/// { "job_id": "2f6c0c1e-8a43-4a43-9d53-5d5b8a1b4f0e" }
/// ```
///
/// `report_id` is accepted in place of `job_id`.
///
/// # Response
///
/// ```json
/// { "status": "COMPLETE", "url": "http://localhost:3000/reports/.../download?expires=...&signature=..." }
/// ```
///
/// or `{ "status": "RUNNING" }`, or `{ "status": "FAILED", "error": "..." }`.
#[instrument(skip_all, fields(job_id))]
pub async fn get_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Json<ReportStatus> {
    tracing::Span::current().record("job_id", request.job_id.as_str());

    let status = state.jobs.status(&request.job_id).await;

    match &status {
        ReportStatus::Running => info!("Report still running"),
        ReportStatus::Complete { .. } => info!("Report ready"),
        ReportStatus::Failed { error } => warn!(error = %error, "Report failed"),
    }

    Json(status)
}

/// GET /reports/:job_id/download - Fetch a report through a signed link.
///
/// # Query Parameters
///
/// - `expires`: Unix timestamp after which the link is refused
/// - `signature`: hex HMAC issued with the link
///
/// Returns the CSV body, `403` for a bad or expired link, `404` if the
/// report does not exist.
#[instrument(skip(state, query))]
pub async fn download_report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, StatusCode> {
    let signer = state.jobs.signer();
    if !signer.verify(&job_id, query.expires, &query.signature, Utc::now()) {
        warn!(job_id = %job_id, "Rejected report link");
        return Err(StatusCode::FORBIDDEN);
    }

    match state.jobs.artifacts().get(&job_id).await {
        Ok(artifact) => {
            info!(job_id = %job_id, bytes = artifact.body.len(), "Report downloaded");
            Ok(([(header::CONTENT_TYPE, artifact.content_type)], artifact.body).into_response())
        }
        Err(ArtifactError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to load report");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
