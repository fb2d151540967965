use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use testpad_rounds::config::{CliArgs, DashboardConfig};
use testpad_rounds::credentials::CredentialStore;
use testpad_rounds::server::build_router;
use testpad_rounds::state::{AppState, SharedState};

fn test_state(api_base: &str, credentials: CredentialStore) -> SharedState {
    let args = CliArgs::parse_from([
        "testpad-rounds",
        "--api-base",
        api_base,
        "--credentials-file",
        "/nonexistent/credentials.json",
    ]);
    let config = DashboardConfig::from_args(args);
    Arc::new(AppState::with_credentials(config, Arc::new(credentials)).unwrap())
}

async fn fake_testpad(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
    let resp = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Poll `/rounds/status` until the background round has finished.
async fn wait_for_round(state: &SharedState) -> Value {
    for _ in 0..200 {
        let (_, body) = send(state, get_req("/rounds/status")).await;
        if body["running"] == false {
            return body;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("round did not finish");
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_connection() {
    let state = test_state("http://127.0.0.1:9", CredentialStore::in_memory());
    let (status, body) = send(&state, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connected"], false);
    assert_eq!(body["round_running"], false);

    let state = test_state("http://127.0.0.1:9", CredentialStore::with_key("k"));
    let (_, body) = send(&state, get_req("/connect")).await;
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn test_browsing_without_key_is_unauthorized() {
    let state = test_state("http://127.0.0.1:9", CredentialStore::in_memory());
    let (status, body) = send(&state, get_req("/projects")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");
    assert_eq!(body["error"], "No API key configured");
}

#[tokio::test]
async fn test_connect_rejects_blank_key() {
    let state = test_state("http://127.0.0.1:9", CredentialStore::in_memory());
    let (status, body) = send(&state, json_req("POST", "/connect", json!({"api_key": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
    assert!(!state.credentials.is_connected());
}

#[tokio::test]
async fn test_connect_keeps_only_verified_keys() {
    let base = fake_testpad(Router::new().route(
        "/projects",
        get(|headers: axum::http::HeaderMap| async move {
            match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
                Some("good") => (StatusCode::OK, Json(json!([]))),
                _ => (StatusCode::UNAUTHORIZED, Json(json!({}))),
            }
        }),
    ))
    .await;
    let state = test_state(&base, CredentialStore::in_memory());

    let (status, body) = send(&state, json_req("POST", "/connect", json!({"api_key": "bad"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "invalid_credential");
    assert!(!state.credentials.is_connected());

    let (status, body) = send(&state, json_req("POST", "/connect", json!({"api_key": " good "}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);

    let (status, body) = send(
        &state,
        Request::builder()
            .method("DELETE")
            .uri("/connect")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert!(!state.credentials.is_connected());
}

#[tokio::test]
async fn test_rejected_key_is_forgotten_by_browsing_routes() {
    let base = fake_testpad(Router::new().route(
        "/projects",
        get(|| async { (StatusCode::UNAUTHORIZED, "") }),
    ))
    .await;
    let state = test_state(&base, CredentialStore::with_key("revoked"));

    let (status, _) = send(&state, get_req("/projects")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!state.credentials.is_connected());
}

#[tokio::test]
async fn test_rate_limit_surfaces_retry_after() {
    let base = fake_testpad(Router::new().route(
        "/projects",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "") }),
    ))
    .await;
    let state = test_state(&base, CredentialStore::with_key("k"));

    let (status, body) = send(&state, get_req("/projects")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "rate_limited");
    assert_eq!(body["retry_after"], 7);
    assert!(state.credentials.is_connected());
}

#[tokio::test]
async fn test_cancel_without_round_conflicts() {
    let state = test_state("http://127.0.0.1:9", CredentialStore::with_key("k"));
    let (status, body) = send(&state, json_req("POST", "/rounds/cancel", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "round_not_running");
}

#[tokio::test]
async fn test_round_requires_folder_name_and_connection() {
    let state = test_state("http://127.0.0.1:9", CredentialStore::with_key("k"));
    let (status, body) = send(
        &state,
        json_req(
            "POST",
            "/rounds",
            json!({"project_id": 1, "source_folder_id": "f1", "new_folder_name": " "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "new_folder_name is required");

    let state = test_state("http://127.0.0.1:9", CredentialStore::in_memory());
    let (status, _) = send(
        &state,
        json_req(
            "POST",
            "/rounds",
            json!({"project_id": 1, "source_folder_id": "f1", "new_folder_name": "Round 2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_round_on_empty_source_finishes_with_validation_error() {
    let base = fake_testpad(Router::new().route(
        "/projects/1/folders/f1",
        get(|| async {
            Json(json!({"folder": {"id": "f1", "name": "Source", "type": "folder", "contents": []}}))
        }),
    ))
    .await;
    let state = test_state(&base, CredentialStore::with_key("k"));

    let (status, body) = send(
        &state,
        json_req(
            "POST",
            "/rounds",
            json!({
                "project_id": 1,
                "source_folder_id": "f1",
                "new_folder_name": "Round 2",
                "testers": " alice "
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    let round_id = body["round_id"].as_str().unwrap().to_string();

    let finished = wait_for_round(&state).await;

    assert_eq!(finished["round_id"], round_id.as_str());
    assert_eq!(finished["new_folder_name"], "Round 2");
    assert_eq!(finished["result"]["success"], false);
    assert_eq!(finished["result"]["created_scripts"], 0);
    assert_eq!(finished["result"]["errors"][0]["step"], "validation");
    assert!(finished["result"].get("new_folder_id").is_none());
    assert!(finished["finished_at"].is_string());
}

#[tokio::test]
async fn test_round_forgets_key_rejected_mid_batch() {
    let base = fake_testpad(
        Router::new()
            .route(
                "/projects/1/folders/f1",
                get(|| async {
                    Json(json!({"folder": {"id": "f1", "name": "Source", "type": "folder", "contents": [
                        {"id": 11, "name": "Login", "type": "script"},
                        {"id": 12, "name": "Checkout", "type": "script"}
                    ]}}))
                }),
            )
            .route("/projects/1/folders", post(|| async { Json(json!({"id": "round-2"})) }))
            .route("/scripts/{id}", get(|| async { (StatusCode::UNAUTHORIZED, "") })),
    )
    .await;
    let state = test_state(&base, CredentialStore::with_key("revoked-mid-round"));

    let (status, _) = send(
        &state,
        json_req(
            "POST",
            "/rounds",
            json!({"project_id": 1, "source_folder_id": "f1", "new_folder_name": "Round 2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let finished = wait_for_round(&state).await;
    assert_eq!(finished["result"]["new_folder_id"], "round-2");
    assert_eq!(finished["result"]["created_scripts"], 0);
    assert_eq!(finished["result"]["errors"].as_array().unwrap().len(), 2);

    let (_, body) = send(&state, get_req("/connect")).await;
    assert_eq!(body["connected"], false);
}
