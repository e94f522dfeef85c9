//! Admin API tests driving the router in-process.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use paes_resilience::admin::setup_admin_router;
use paes_resilience::health::probe::ProbeError;

mod common;
use common::{test_context, StaticProbe, API_KEY};

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", API_KEY));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<Value>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).ok();
    (status, json)
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = setup_admin_router(test_context(StaticProbe(Ok(200))));

    let req = Request::builder()
        .uri("/admin/status")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/admin/status")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_request_id() {
    let app = setup_admin_router(test_context(StaticProbe(Ok(200))));

    let res = app
        .clone()
        .oneshot(request(Method::GET, "/admin/status", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let (_, body) = send(&app, request(Method::GET, "/admin/status", None)).await;
    let body = body.unwrap();
    assert_eq!(body["status"], "operational");
    assert_eq!(body["init"], "ready");
}

#[tokio::test]
async fn test_breaker_listing_and_reset() {
    let ctx = test_context(StaticProbe(Ok(200)));
    let breaker = ctx.breakers.get_or_create("supabase");
    for _ in 0..5 {
        breaker.failure();
    }
    let app = setup_admin_router(ctx);

    let (status, body) = send(&app, request(Method::GET, "/admin/breakers", None)).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body[0]["name"], "supabase");
    assert_eq!(body[0]["state"], "open");

    let (status, body) = send(
        &app,
        request(Method::POST, "/admin/breakers/supabase/reset", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["state"], "closed");

    let (status, body) = send(
        &app,
        request(Method::POST, "/admin/breakers/unknown/reset", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("unknown"));
}

#[tokio::test]
async fn test_resource_validation() {
    let app = setup_admin_router(test_context(StaticProbe(Err(ProbeError::Network(
        "connection refused".into(),
    )))));

    let (status, body) = send(&app, request(Method::GET, "/admin/resources/validate", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "missing required parameter 'url'");

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            "/admin/resources/validate?url=https%3A%2F%2Fcdn.example.com%2Flogo.png",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["url"], "https://cdn.example.com/logo.png");
    assert_eq!(body["reachable"], false);
    assert_eq!(body["status"]["failed_attempts"], 1);

    let (_, body) = send(&app, request(Method::GET, "/admin/breakers", None)).await;
    let body = body.unwrap();
    assert_eq!(body[0]["name"], "resource:cdn.example.com");
    assert_eq!(body[0]["failure_count"], 1);

    let (_, body) = send(&app, request(Method::GET, "/admin/queries", None)).await;
    let body = body.unwrap();
    assert_eq!(body["total_queries"], 1);
    assert_eq!(body["recent"][0]["query_name"], "resource_probe");
    assert_eq!(body["recent"][0]["success"], false);
}

#[tokio::test]
async fn test_navigation_record_and_predict() {
    let app = setup_admin_router(test_context(StaticProbe(Ok(200))));

    for to in ["/practice", "/practice", "/ranking"] {
        let (status, _) = send(
            &app,
            request(
                Method::POST,
                "/admin/navigation",
                Some(serde_json::json!({ "from": "/home", "to": to })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, body) = send(
        &app,
        request(Method::GET, "/admin/navigation/predict?route=/home", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let predictions = body.unwrap()["predictions"].as_array().unwrap().clone();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0]["route"], "/practice");

    let (status, _) = send(&app, request(Method::GET, "/admin/navigation/predict", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/admin/navigation",
            Some(serde_json::json!({ "from": "", "to": "/x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logs_filtering() {
    let ctx = test_context(StaticProbe(Ok(200)));
    ctx.logger.info("auth", "user signed in", None);
    ctx.logger.warn("db", "slow query", None);
    ctx.logger.error("db", "query failed", None);
    let app = setup_admin_router(ctx);

    let (status, body) = send(&app, request(Method::GET, "/admin/logs?level=warn", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap().as_array().unwrap().len(), 2);

    let (_, body) = send(&app, request(Method::GET, "/admin/logs?module=auth", None)).await;
    assert_eq!(body.unwrap()[0]["message"], "user signed in");

    let (_, body) = send(&app, request(Method::GET, "/admin/logs?limit=1", None)).await;
    assert_eq!(body.unwrap()[0]["message"], "query failed");

    let (status, _) = send(&app, request(Method::GET, "/admin/logs?level=loud", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queries_and_entropy() {
    let ctx = test_context(StaticProbe(Ok(200)));
    let _ = ctx
        .queries
        .measure_query("progress", || async { Err::<(), _>("timeout") })
        .await;
    ctx.entropy.next_u64();
    let app = setup_admin_router(ctx);

    let (status, body) = send(&app, request(Method::GET, "/admin/queries", None)).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["total_queries"], 1);
    assert_eq!(body["success_rate"], 0.0);

    let (status, body) = send(&app, request(Method::GET, "/admin/entropy", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["source"], "os");
}
