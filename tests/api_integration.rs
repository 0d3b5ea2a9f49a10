//! Integration tests for the session service
//!
//! Tests API endpoints against a router with shared state

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use facegate::core::{create_router, SyntheticFace};
use facegate::GateConfig;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

fn create_test_router() -> Router {
    create_router(GateConfig {
        stability_time_ms: 500,
        ..Default::default()
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json)
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn new_session(app: &Router, body: &str) -> String {
    let (status, json) = send(app, "POST", "/session/new", Some(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    json["session_id"].as_str().unwrap().to_string()
}

fn good_frame(t: u64) -> String {
    serde_json::to_string(&SyntheticFace::centered(640.0, 480.0).frame(t, 640.0, 480.0)).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], facegate::VERSION);
    assert_eq!(json["sessions_active"], 0);
}

#[tokio::test]
async fn test_create_session() {
    let app = create_test_router();

    let (status, json) = send(&app, "POST", "/session/new", Some(r#"{"challenges": ["turn_right", "turn_left"]}"#.into())).await;

    assert_eq!(status, StatusCode::OK);
    let id = json["session_id"].as_str().unwrap();
    assert_eq!(json["websocket_url"], format!("/ws/{}", id));
    assert_eq!(json["challenges"], serde_json::json!(["turn_right", "turn_left"]));

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 1);
}

#[tokio::test]
async fn test_unknown_challenge_rejected() {
    let app = create_test_router();

    let (status, _) = send(&app, "POST", "/session/new", Some(r#"{"challenges": ["spin"]}"#.into())).await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let app = create_router(GateConfig {
        min_face_size: 0.9,
        max_face_size: 0.1,
        ..Default::default()
    });

    let (status, json) = send(&app, "POST", "/session/new", Some("{}".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid configuration"));
}

#[tokio::test]
async fn test_session_not_found() {
    let app = create_test_router();

    let (status, _) = send(&app, "GET", "/session/nonexistent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/session/nonexistent/sample", Some(good_frame(0))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/session/nonexistent/reset", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_session_flow() {
    let app = create_test_router();
    let id = new_session(&app, "{}").await;

    let (status, json) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "initializing");
    assert_eq!(json["stopped"], false);

    let (status, _) = send(&app, "POST", &format!("/session/{}/sample", id), Some(good_frame(0))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Let the session task pick up the frame
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (_, json) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(json["state"], "ready");
    assert_eq!(json["detection"]["tick"], 1);
    assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));

    let (status, _) = send(&app, "POST", &format!("/session/{}/reset", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "POST", &format!("/session/{}/capture-complete", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", &format!("/session/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/session/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 0);
}

#[tokio::test]
async fn test_websocket_requires_session() {
    let app = create_test_router();

    let (status, _) = send(&app, "GET", "/ws/nonexistent", None).await;

    // Either the missing upgrade headers or the unknown id rejects it
    assert!(status.is_client_error());
}
