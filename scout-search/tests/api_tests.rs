//! HTTP API integration tests

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::{harness, wait_for_status, MockLlm, MockScraper};
use http_body_util::BodyExt;
use scout_search::models::SessionStatus;
use scout_search::services::{SearchOrchestrator, SharedScraper};
use scout_search::{build_router, AppState};
use serde_json::{json, Value};
use std::time::Duration;
use tower::util::ServiceExt;

fn test_app() -> (Router, SearchOrchestrator) {
    let scraper = MockScraper::new("linkedin")
        .with_jobs("devops engineer", 2)
        .with_jobs("sre", 1)
        .with_delay(Duration::from_millis(50))
        .shared();
    let h = harness(vec![scraper as SharedScraper], MockLlm::answering());
    let app = build_router(AppState::new(h.orchestrator.clone()));
    (app, h.orchestrator)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn start_body(session_id: &str) -> Value {
    json!({
        "session_id": session_id,
        "settings": {
            "positions": ["devops engineer", "sre"],
            "sources": {"linkedin": true, "indeed": false}
        }
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "scout-search");
    assert_eq!(json["scrapers"], json!(["linkedin"]));
    assert_eq!(json["sessions_in_memory"], 0);
}

#[tokio::test]
async fn test_search_lifecycle_over_http() {
    let (app, orchestrator) = test_app();

    let (status, json) = send(&app, "POST", "/api/multi-stage/search", Some(start_body("web"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["success"], true);
    assert_eq!(json["session_id"], "web");
    assert_eq!(json["status"], "running");

    let (status, json) = send(&app, "POST", "/api/multi-stage/search", Some(start_body("web"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");

    wait_for_status(&orchestrator, "web", SessionStatus::Completed).await;

    let (status, json) = send(&app, "GET", "/api/multi-stage/progress/web", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["current_stage"], "completed");
    assert_eq!(json["jobs_collected"], 3);

    let (status, json) = send(&app, "GET", "/api/multi-stage/vacancies/web?status=filtered", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["vacancies"].as_array().map(Vec::len), Some(3));

    let (status, json) = send(&app, "GET", "/api/multi-stage/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["sessions"][0]["session_id"], "web");
    assert_eq!(json["sessions"][0]["status"], "completed");

    // Completed sessions can no longer be controlled
    let (status, _) = send(&app, "POST", "/api/multi-stage/pause/web", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "DELETE", "/api/multi-stage/sessions/web", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/api/multi-stage/progress/web", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (app, _) = test_app();

    let (status, json) = send(&app, "GET", "/api/multi-stage/progress/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, "POST", "/api/multi-stage/stop/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/api/multi-stage/resume/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/api/multi-stage/vacancies/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_requests() {
    let (app, _) = test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/multi-stage/search",
        Some(json!({"session_id": "bad", "settings": {"positions": []}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app, "POST", "/api/multi-stage/search", Some(start_body("filter"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(&app, "GET", "/api/multi-stage/vacancies/filter?status=archived", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/multi-stage/resume/filter")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
