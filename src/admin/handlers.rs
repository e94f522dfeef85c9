use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ResilienceContext;
use crate::entropy::EntropyStatus;
use crate::health::resource::ResourceStatus;
use crate::lifecycle::init::InitPhase;
use crate::lifecycle::recovery::RecoveryStatus;
use crate::navigation::predictor::Prediction;
use crate::observability::query_monitor::PerformanceStats;
use crate::observability::system_log::{LogEntry, LogFilter, LogLevel};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};

/// Errors returned by admin handlers, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("missing required parameter '{0}'")]
    MissingParam(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::MissingParam(_) | AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Admin request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub init: InitPhase,
    pub uptime_secs: u64,
    pub breakers: usize,
    pub log_entries: usize,
    pub recovery: RecoveryStatus,
}

pub async fn get_status(State(ctx): State<Arc<ResilienceContext>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        init: ctx.init_phase(),
        uptime_secs: ctx.uptime_secs(),
        breakers: ctx.breakers.len(),
        log_entries: ctx.logger.len(),
        recovery: ctx.recovery.status(),
    })
}

pub async fn get_breakers(State(ctx): State<Arc<ResilienceContext>>) -> Json<Vec<BreakerSnapshot>> {
    Json(ctx.breakers.snapshots())
}

#[derive(Serialize)]
pub struct BreakerReset {
    pub name: String,
    pub state: CircuitState,
}

pub async fn reset_breaker(
    State(ctx): State<Arc<ResilienceContext>>,
    Path(name): Path<String>,
) -> Result<Json<BreakerReset>, AdminError> {
    let breaker = ctx
        .breakers
        .get(&name)
        .ok_or_else(|| AdminError::NotFound(format!("breaker '{}'", name)))?;
    breaker.reset();
    tracing::info!(breaker = %name, "Breaker reset via admin API");

    Ok(Json(BreakerReset {
        state: breaker.current_state(),
        name,
    }))
}

pub async fn get_queries(State(ctx): State<Arc<ResilienceContext>>) -> Json<PerformanceStats> {
    Json(ctx.queries.performance_stats())
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
    pub module: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_logs(
    State(ctx): State<Arc<ResilienceContext>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, AdminError> {
    let min_level = query
        .level
        .as_deref()
        .map(str::parse::<LogLevel>)
        .transpose()
        .map_err(|e| AdminError::BadRequest(e.to_string()))?;

    let filter = LogFilter {
        min_level,
        module: query.module,
        limit: query.limit,
    };
    Ok(Json(ctx.logger.entries(&filter)))
}

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct ResourceCheck {
    pub url: String,
    pub reachable: bool,
    pub should_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceStatus>,
}

pub async fn validate_resource(
    State(ctx): State<Arc<ResilienceContext>>,
    Query(query): Query<ResourceQuery>,
) -> Result<Json<ResourceCheck>, AdminError> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or(AdminError::MissingParam("url"))?;

    let reachable = ctx.resources.validate_resource(&url).await;
    Ok(Json(ResourceCheck {
        reachable,
        should_retry: ctx.resources.should_retry(&url),
        status: ctx.resources.status(&url),
        url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub route: Option<String>,
}

#[derive(Serialize)]
pub struct PredictionResponse {
    pub route: String,
    pub predictions: Vec<Prediction>,
}

pub async fn predict_navigation(
    State(ctx): State<Arc<ResilienceContext>>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictionResponse>, AdminError> {
    let route = query
        .route
        .filter(|r| !r.is_empty())
        .ok_or(AdminError::MissingParam("route"))?;

    Ok(Json(PredictionResponse {
        predictions: ctx.navigation.scored_predictions(&route),
        route,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NavigationEvent {
    pub from: String,
    pub to: String,
}

pub async fn record_navigation(
    State(ctx): State<Arc<ResilienceContext>>,
    Json(event): Json<NavigationEvent>,
) -> Result<StatusCode, AdminError> {
    if event.from.is_empty() {
        return Err(AdminError::MissingParam("from"));
    }
    if event.to.is_empty() {
        return Err(AdminError::MissingParam("to"));
    }

    // Persisting may hit the file store.
    let navigation = ctx.navigation.clone();
    tokio::task::spawn_blocking(move || navigation.record_navigation(&event.from, &event.to))
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?
        .map_err(|e| AdminError::Internal(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_entropy(State(ctx): State<Arc<ResilienceContext>>) -> Json<EntropyStatus> {
    Json(ctx.entropy.status())
}
