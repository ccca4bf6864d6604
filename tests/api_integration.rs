//! Control surface behavior via in-process requests

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use carousel::api::CarouselServer;
use carousel::blacklist::NoopBlacklist;
use carousel::cluster::PublishGate;
use carousel::scheduler::CarouselScheduler;
use carousel::storage::FileMetadataStore;
use common::{seeded_store, RecordingTask};

struct TestApi {
    app: Router,
    scheduler: Arc<CarouselScheduler>,
    _state_dir: TempDir,
}

fn test_api() -> TestApi {
    let state_dir = TempDir::new().unwrap();
    let scheduler = Arc::new(CarouselScheduler::new(
        seeded_store("methode", &["u1", "u2", "u3"]),
        RecordingTask::new(),
        Arc::new(NoopBlacklist),
        Arc::new(FileMetadataStore::new(state_dir.path()).unwrap()),
        PublishGate::always_open(),
    ));
    let server = CarouselServer::new(scheduler.clone(), "127.0.0.1:0".parse().unwrap());
    TestApi {
        app: server.build_router(),
        scheduler,
        _state_dir: state_dir,
    }
}

fn cycle_body(name: &str) -> Value {
    json!({
        "name": name,
        "type": "ThrottledWholeCollection",
        "collection": "methode",
        "origin": "methode-web-pub",
        "coolDown": "1h",
        "throttle": "1s"
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, location, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn create_list_get_delete_cycle() {
    let api = test_api();

    let (status, location, _) = send(&api.app, post("/cycles", cycle_body("archive"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let location = location.expect("created cycle has a Location header");
    assert!(location.starts_with("/cycles/"));

    let (status, _, cycles) = send(&api.app, get("/cycles")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycles.as_array().unwrap().len(), 1);

    let (status, _, cycle) = send(&api.app, get(&location)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycle["name"], "archive");
    assert_eq!(cycle["type"], "ThrottledWholeCollection");
    assert_eq!(cycle["metadata"]["state"], json!(["stopped"]));

    let delete = Request::builder()
        .method("DELETE")
        .uri(&location)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&api.app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&api.app, get(&location)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_duplicate_cycle_conflicts() {
    let api = test_api();

    let (status, _, _) = send(&api.app, post("/cycles", cycle_body("archive"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(&api.app, post("/cycles", cycle_body("archive"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("conflict"));

    api.scheduler.shutdown().await;
}

#[tokio::test]
async fn create_invalid_cycle_is_bad_request() {
    let api = test_api();

    let mut body = cycle_body("broken");
    body["collection"] = json!("");
    let (status, _, _) = send(&api.app, post("/cycles", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lifecycle_endpoints_drive_the_cycle() {
    let api = test_api();

    let (_, location, _) = send(&api.app, post("/cycles", cycle_body("archive"))).await;
    let location = location.unwrap();
    let id = location.rsplit('/').next().unwrap().to_string();

    let (status, _, _) = send(&api.app, post(&format!("/cycles/{id}/start"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    common::wait_for(|| async {
        let cycle = api.scheduler.cycle(&id).await.unwrap();
        let state = cycle.state().await;
        !state.contains(&carousel::CycleState::Stopped)
    })
    .await;

    let (status, _, _) = send(&api.app, post(&format!("/cycles/{id}/stop"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, cycle) = send(&api.app, get(&location)).await;
    assert!(cycle["metadata"]["state"]
        .as_array()
        .unwrap()
        .contains(&json!("stopped")));

    let (status, _, _) = send(&api.app, post(&format!("/cycles/{id}/reset"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, cycle) = send(&api.app, get(&location)).await;
    assert_eq!(cycle["metadata"]["iteration"], 0);
    assert_eq!(cycle["metadata"]["completed"], 0);

    let (status, _, _) = send(&api.app, post(&format!("/cycles/{id}/resume"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    api.scheduler.shutdown().await;
}

#[tokio::test]
async fn lifecycle_on_unknown_cycle_is_not_found() {
    let api = test_api();
    for action in ["start", "stop", "resume", "reset"] {
        let (status, _, _) =
            send(&api.app, post(&format!("/cycles/nope/{action}"), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{action}");
    }
}

#[tokio::test]
async fn throttle_inspect_and_replace() {
    let api = test_api();

    let (_, location, _) = send(&api.app, post("/cycles", cycle_body("archive"))).await;
    let location = location.unwrap();
    let id = location.rsplit('/').next().unwrap().to_string();

    let (status, _, throttle) = send(&api.app, get(&format!("/cycles/{id}/throttle"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(throttle["interval"], "1s");

    let put = Request::builder()
        .method("PUT")
        .uri(format!("/cycles/{id}/throttle"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"interval": "30s"}).to_string()))
        .unwrap();
    let (status, new_location, _) = send(&api.app, put).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        new_location.unwrap(),
        location,
        "same name and collection keep the same id"
    );

    let (_, _, throttle) = send(&api.app, get(&format!("/cycles/{id}/throttle"))).await;
    assert_eq!(throttle["interval"], "30s");

    api.scheduler.shutdown().await;
}

#[tokio::test]
async fn throttle_routes_reject_unthrottled_cycles() {
    let api = test_api();

    let body = json!({
        "name": "recent",
        "type": "ShortTerm",
        "collection": "methode",
        "origin": "methode-web-pub",
        "coolDown": "1m",
        "timeWindow": "1h"
    });
    let (status, location, _) = send(&api.app, post("/cycles", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = location.unwrap().rsplit('/').next().unwrap().to_string();

    let (status, _, _) = send(&api.app, get(&format!("/cycles/{id}/throttle"))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let put = Request::builder()
        .method("PUT")
        .uri(format!("/cycles/{id}/throttle"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"interval": "30s"}).to_string()))
        .unwrap();
    let (status, _, _) = send(&api.app, put).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_aggregates_cycle_state() {
    let api = test_api();

    send(&api.app, post("/cycles", cycle_body("archive"))).await;

    let (status, _, health) = send(&api.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cycles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn gtg_follows_the_manual_toggle() {
    let api = test_api();

    let (status, _, _) = send(&api.app, get("/__gtg")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&api.app, post("/scheduler/stop", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&api.app, get("/__gtg")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _, _) = send(&api.app, post("/scheduler/start", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&api.app, get("/__gtg")).await;
    assert_eq!(status, StatusCode::OK);
}
