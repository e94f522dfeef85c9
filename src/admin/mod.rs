//! Admin HTTP API.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>` and answers
//! JSON. Bad input is a 400, unknown names a 404, failures a 500, each with
//! an `{"error": ...}` body.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::context::ResilienceContext;

#[allow(deprecated)]
pub fn setup_admin_router(ctx: Arc<ResilienceContext>) -> Router {
    let timeout = Duration::from_secs(ctx.config().admin.request_timeout_secs);

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/queries", get(get_queries))
        .route("/admin/logs", get(get_logs))
        .route("/admin/resources/validate", get(validate_resource))
        .route("/admin/navigation", post(record_navigation))
        .route("/admin/navigation/predict", get(predict_navigation))
        .route("/admin/entropy", get(get_entropy))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), admin_auth_middleware))
        .with_state(ctx)
        .layer(TimeoutLayer::new(timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}
