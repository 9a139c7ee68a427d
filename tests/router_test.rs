// Integration tests for the HTTP surface
//
// Note: Tests use tower::ServiceExt::oneshot. Requests to /api/ws reach the
// WebSocketUpgrade extractor without a real upgrade, so it rejects them with a
// client error. The end-to-end upgrade is covered in websocket_test.rs.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use outpost::api::{create_router, WsAppState};
use outpost::config::BuildingsConfig;
use outpost::service::Services;
use serde_json::Value;
use tower::ServiceExt;

fn make_router() -> Router {
    let services = Services::new(&BuildingsConfig::default());
    create_router(WsAppState::new(services, 16))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_ok() {
    let resp = make_router().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn test_ws_without_upgrade_is_client_error() {
    let resp = make_router().oneshot(get_request("/api/ws")).await.unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route_not_found() {
    let resp = make_router().oneshot(get_request("/api/events")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let req = Request::builder()
        .uri("/health")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let resp = make_router().oneshot(req).await.unwrap();

    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
