use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::http::server::AppState;
use crate::ingest::DocumentEvent;
use crate::resilience::{CircuitBreakerState, CircuitStatus};
use crate::status::StatusReport;

/// Upper bound on job IDs per status request.
pub const MAX_STATUS_IDS: usize = 100;

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct BreakerStatus {
    pub dependency: String,
    pub status: CircuitStatus,
    pub state: CircuitBreakerState,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub ids: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

/// Accept a document notification and dispatch every allowed document.
///
/// 202 when nothing failed, 503 when an open circuit turned documents
/// away (the caller should back off), 502 for other dispatch failures.
pub async fn post_notification(
    State(state): State<AppState>,
    Json(event): Json<DocumentEvent>,
) -> Response {
    let report = state.ingestor.ingest(event).await;

    let status = if report.has_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if !report.failed.is_empty() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(report)).into_response()
}

pub async fn get_job_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let ids: Vec<String> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    if ids.is_empty() {
        return bad_request("query parameter 'ids' must list at least one job ID");
    }
    if ids.len() > MAX_STATUS_IDS {
        return bad_request(format!("at most {MAX_STATUS_IDS} job IDs per request"));
    }

    let reports: HashMap<String, StatusReport> = state.status.poll_statuses(&ids).await;
    Json(reports).into_response()
}

/// Report the breaker guarding the dispatcher's dependency.
///
/// Read-only; unknown dependencies are 404 and leave no state behind.
pub async fn get_breaker(
    State(state): State<AppState>,
    Path(dependency): Path<String>,
) -> Response {
    if dependency != state.ingestor.dependency() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("no circuit breaker for '{dependency}'"),
            }),
        )
            .into_response();
    }

    let (status, breaker_state) = state.breaker.view(&dependency).await;
    Json(BreakerStatus {
        dependency,
        status,
        state: breaker_state,
    })
    .into_response()
}
