//! HTTP request handlers.

use super::AppState;
use crate::report::{ReportError, ReportPoll};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub report_id: String,
}

pub async fn handle_trigger_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.reports.submit() {
        Ok(report_id) => Json(TriggerResponse { report_id }).into_response(),
        Err(ReportError::Unavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Report generation unavailable").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to submit report: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub report_id: Option<String>,
}

pub async fn handle_get_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    let Some(report_id) = query.report_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing report_id parameter").into_response();
    };

    match state.reports.poll(&report_id) {
        Ok(ReportPoll::Running) => "Running".into_response(),
        Ok(ReportPoll::Failed) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Error generating report").into_response()
        }
        Ok(ReportPoll::Complete(path)) => match tokio::fs::read(&path).await {
            Ok(body) => (
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"report_{}.csv\"", report_id),
                    ),
                ],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Failed to read report {} at {}: {}", report_id, path.display(), e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Report file not found").into_response()
            }
        },
        Err(ReportError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "Report not found").into_response()
        }
        Err(ReportError::ArtifactMissing(path)) => {
            tracing::error!(
                "Report {} is complete but {} is missing",
                report_id,
                path.display()
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Report file not found").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_report_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.reports.job(&id) {
        Ok(job) => Json(job).into_response(),
        Err(ReportError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "Report not found").into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub observations: i64,
}

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.count_observations() {
        Ok(observations) => Json(HealthResponse {
            status: "ok",
            observations,
        })
        .into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
