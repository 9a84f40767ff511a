//! Router-level tests driving the HTTP API against an in-memory store.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use beaconwatch_core::{Config, MemoryStore, TrackedRegion};
use beaconwatch_server::api::create_router;
use beaconwatch_server::state::AppState;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

const KITCHEN: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";

async fn app_with(store: MemoryStore) -> (Router, AppState) {
    let (state, _task) = AppState::with_store(
        &Config::default(),
        Box::new(store),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    (create_router(state.clone()), state)
}

async fn app() -> (Router, AppState) {
    app_with(MemoryStore::default()).await
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn put_kitchen(app: &Router) -> Value {
    let (status, body) = send(
        app,
        Method::PUT,
        "/api/regions",
        Some(json!({
            "regions": [{ "uuid": KITCHEN, "major": 1, "label": "Kitchen" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn sample(proximity: &str, accuracy: f64) -> Value {
    json!({
        "beacon": { "uuid": KITCHEN, "major": 1, "minor": 7 },
        "proximity": proximity,
        "accuracy": accuracy,
        "rssi": -61,
        "timestamp": "2026-01-05T21:14:03Z"
    })
}

#[tokio::test]
async fn test_health_reports_running_engine() {
    let (app, _state) = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine_running"], true);
    assert_eq!(body["subscriptions"], 0);
}

#[tokio::test]
async fn test_replace_regions_reconciles_and_subscribes() {
    let (app, state) = app().await;
    let body = put_kitchen(&app).await;

    assert_eq!(body["regions"][0]["identity"], format!("{KITCHEN}:1"));
    assert_eq!(body["outcome"]["outcome"], "converged");
    let actions: Vec<&str> = body["outcome"]["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["start_monitoring", "start_ranging"]);
    assert_eq!(state.subscription_count().await, 1);

    let (_, radio) = send(&app, Method::GET, "/api/radio", None).await;
    assert_eq!(radio["monitored"][0]["label"], "Kitchen");
    assert_eq!(radio["ranged"][0]["label"], "Kitchen");

    // Replacing with the same set is idempotent.
    let body = put_kitchen(&app).await;
    assert_eq!(body["outcome"]["actions"], json!([]));
}

#[tokio::test]
async fn test_invalid_region_input_is_rejected() {
    let (app, _state) = app().await;
    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/regions",
        Some(json!({ "regions": [{ "uuid": KITCHEN, "minor": 2, "label": "Hall" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_region");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/radio/state",
        Some(json!({ "region": "not-a-region", "state": "inside" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_samples_feed_rankings() {
    let (app, _state) = app().await;
    put_kitchen(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/radio/samples",
        Some(json!({
            "region": format!("{KITCHEN}:1"),
            "samples": [sample("far", 8.0), sample("near", 1.5)]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, Method::GET, "/api/rankings", None).await;
    assert_eq!(status, StatusCode::OK);
    let closest = &body["closest"];
    assert_eq!(closest["region"]["label"], "Kitchen");
    assert_eq!(closest["last_sample"]["proximity"], "near");
    assert_eq!(closest["history_len"], 2);
    assert_eq!(closest["sort_weight"], json!([[1, 1.5], 1]));
}

#[tokio::test]
async fn test_state_determination_updates_ranking() {
    let (app, _state) = app().await;
    put_kitchen(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/radio/state",
        Some(json!({ "region": format!("{KITCHEN}:1"), "state": "inside" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, body) = send(&app, Method::GET, "/api/rankings", None).await;
    assert_eq!(body["rankings"][0]["state"], "inside");
}

#[tokio::test]
async fn test_capability_loss_blocks_reconcile() {
    let (app, _state) = app().await;
    put_kitchen(&app).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/radio/capabilities",
        Some(json!({
            "location_services_enabled": true,
            "monitoring_available": true,
            "ranging_available": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::POST, "/api/regions/reconcile", None).await;
    assert_eq!(body["outcome"]["outcome"], "unavailable");
    assert_eq!(body["outcome"]["capability"], "ranging");

    let (_, telemetry) = send(&app, Method::GET, "/api/telemetry", None).await;
    let events: Vec<&str> = telemetry["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"monitoring_started"));
    assert!(events.contains(&"capability_unavailable"));
}

#[tokio::test]
async fn test_denied_authorization_awaits_grant() {
    let (app, _state) = app().await;
    send(
        &app,
        Method::PUT,
        "/api/radio/authorization",
        Some(json!({ "status": "denied" })),
    )
    .await;

    let body = put_kitchen(&app).await;
    assert_eq!(body["outcome"]["outcome"], "awaiting_authorization");

    let (_, radio) = send(
        &app,
        Method::PUT,
        "/api/radio/authorization",
        Some(json!({ "status": "authorized_when_in_use" })),
    )
    .await;
    assert_eq!(radio["authorization"], "authorized_when_in_use");
    assert_eq!(radio["monitored"][0]["label"], "Kitchen");
}

#[tokio::test]
async fn test_reset_stops_everything_but_keeps_desired() {
    let (app, _state) = app().await;
    put_kitchen(&app).await;

    let (status, body) = send(&app, Method::POST, "/api/radio/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions"][0]["action"], "stop_ranging");
    assert_eq!(body["actions"][1]["action"], "stop_monitoring");

    let (_, radio) = send(&app, Method::GET, "/api/radio", None).await;
    assert_eq!(radio["monitored"], json!([]));

    let (_, regions) = send(&app, Method::GET, "/api/regions", None).await;
    assert_eq!(regions["regions"][0]["label"], "Kitchen");
}

#[tokio::test]
async fn test_monitoring_failure_is_recorded() {
    let (app, _state) = app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/radio/failures",
        Some(json!({ "error": "Region monitoring limit reached" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, telemetry) = send(&app, Method::GET, "/api/telemetry", None).await;
    let last = telemetry["events"].as_array().unwrap().last().cloned().unwrap();
    assert_eq!(last["event"], "monitoring_failed");
    assert_eq!(last["error"], "Region monitoring limit reached");
}

#[tokio::test]
async fn test_stored_regions_are_tracked_on_startup() {
    let stored = TrackedRegion::new(Uuid::parse_str(KITCHEN).unwrap(), Some(1), None, "Kitchen")
        .unwrap();
    let (app, state) = app_with(MemoryStore::with_regions(vec![stored])).await;

    assert_eq!(state.subscription_count().await, 1);
    let (_, regions) = send(&app, Method::GET, "/api/regions", None).await;
    assert_eq!(regions["regions"][0]["description"], "Major: 1 Minor: Any");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _state) = app().await;
    let (status, body) = send(&app, Method::GET, "/api/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "beaconwatch API");
}

#[tokio::test]
async fn test_regions_survive_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.regions_path = Some(dir.path().join("nested").join("regions.json"));

    let shutdown = CancellationToken::new();
    let (state, task) = assert_ok!(AppState::new(&config, shutdown.clone()).await);
    put_kitchen(&create_router(state)).await;
    shutdown.cancel();
    assert_ok!(task.await);

    let (state, _task) = assert_ok!(AppState::new(&config, CancellationToken::new()).await);
    let (_, regions) = send(&create_router(state), Method::GET, "/api/regions", None).await;
    assert_eq!(regions["regions"][0]["label"], "Kitchen");
}
