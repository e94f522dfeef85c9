use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::context::ResilienceContext;

/// Require `Authorization: Bearer <admin.api_key>`.
///
/// The key is read per request so a reloaded config takes effect at once.
pub async fn admin_auth_middleware(
    State(ctx): State<Arc<ResilienceContext>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = ctx.config();

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == config.admin.api_key);

    if authorized {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    Err(StatusCode::UNAUTHORIZED)
}
