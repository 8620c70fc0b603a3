use alloy_primitives::{Address, U256};
use axum::http::StatusCode;
use chainpilot_core::config::Config;
use chainpilot_core::engine::{Collaborators, Engine};
use chainpilot_core::store::MemorySequenceStore;
use chainpilot_core::test_support::{
    chain_registry, MockChain, MockOptionsApi, MockRouter, MockSigner, RecordingQueue,
};
use chainpilot_core::tokens::ChainTokenDirectory;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const USER: Address = Address::repeat_byte(0xa1);
const RECIPIENT: Address = Address::repeat_byte(0xb2);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine(chain: MockChain) -> Arc<Engine> {
    let chains = Arc::new(chain_registry(vec![chain]));
    let collaborators = Collaborators {
        tokens: Arc::new(ChainTokenDirectory::new(chains.clone())),
        chains,
        signer: Arc::new(MockSigner::new()),
        store: Arc::new(MemorySequenceStore::new()),
        router: Arc::new(MockRouter::evm(Address::repeat_byte(0xee))),
        options: Arc::new(MockOptionsApi::new(vec![])),
    };
    let mut config = Config::default();
    config.executor.confirmation_interval_secs = 0;
    config.executor.inter_transaction_delay_secs = 0;
    config.stream.interval_ms = 1;
    config.stream.max_iterations = 5;
    Arc::new(
        Engine::assemble_with_queue(config, collaborators, Arc::new(RecordingQueue::new()), None)
            .unwrap(),
    )
}

fn funded_chain() -> MockChain {
    let chain = MockChain::new(1);
    chain.set_native_balance(USER, U256::from(10u64).pow(U256::from(19u64)));
    chain
}

fn transfer_task(amount: &str) -> Value {
    json!({
        "task": format!("send {amount} ETH"),
        "action": "TRANSFER",
        "chainId": 1,
        "params": { "token": "ETH", "amount": amount, "recipient": RECIPIENT },
    })
}

async fn send(app: axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

async fn delete(app: axum::Router, uri: &str) -> StatusCode {
    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    app.oneshot(req).await.unwrap().status()
}

/// Invoke one transfer and save the draft; returns the stored sequence JSON.
async fn saved_transfer(app: &axum::Router) -> Value {
    let (status, draft) = post_json(
        app.clone(),
        "/api/actions/invoke",
        json!({ "userId": "alice", "userAddress": USER, "actions": [transfer_task("1")] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, saved) = post_json(
        app.clone(),
        "/api/sequences",
        json!({ "userId": "alice", "sequence": draft }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    saved
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoke_returns_draft_sequence() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = post_json(
        app,
        "/api/actions/invoke",
        json!({ "userId": "alice", "userAddress": USER, "actions": [transfer_task("1")] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions"].as_array().unwrap().len(), 1);
    assert_eq!(body["actions"][0]["error"], json!(false));
    assert_eq!(body["actions"][0]["data"]["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invoke_with_missing_params_asks_for_information() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let mut task = transfer_task("1");
    task["missingParams"] = json!([{ "name": "recipient", "description": "who receives the funds" }]);

    let (status, body) = post_json(app, "/api/actions/invoke", json!({ "actions": [task] })).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("I need more information to process your request:"));
    assert!(message.contains("Missing parameters: recipient (who receives the funds)"));
    assert_eq!(body["missingParams"][0]["name"], json!("recipient"));
}

#[tokio::test]
async fn invoke_keeps_failed_tasks_as_error_results() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = post_json(
        app,
        "/api/actions/invoke",
        json!({ "userAddress": USER, "actions": [transfer_task("1"), transfer_task("-3")] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions"][0]["error"], json!(false));
    assert_eq!(body["actions"][1]["error"], json!(true));
}

#[tokio::test]
async fn invoke_with_empty_batch_returns_empty_draft() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = post_json(app, "/api/actions/invoke", json!({ "actions": [] })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["actions"].as_array().unwrap().is_empty());
    assert!(body["id"].is_string());
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_list_get_delete_round() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let saved = saved_transfer(&app).await;
    let id = saved["id"].as_str().unwrap().to_string();
    assert_eq!(saved["userId"], json!("alice"));

    let (status, list) = get(app.clone(), "/api/sequences?user_id=alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, other) = get(app.clone(), "/api/sequences?user_id=bob").await;
    assert!(other.as_array().unwrap().is_empty());

    let (status, one) = get(app.clone(), &format!("/api/sequences/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["id"], json!(id));

    assert_eq!(delete(app.clone(), &format!("/api/sequences/{id}")).await, StatusCode::NO_CONTENT);
    let (status, _) = get(app.clone(), &format!("/api/sequences/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(delete(app, &format!("/api/sequences/{id}")).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn save_rejects_draft_with_errors() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (_, draft) = post_json(
        app.clone(),
        "/api/actions/invoke",
        json!({ "userAddress": USER, "actions": [transfer_task("-3")] }),
    )
    .await;

    let (status, body) = post_json(
        app.clone(),
        "/api/sequences",
        json!({ "userId": "alice", "sequence": draft }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("SEQUENCE_HAS_ERRORS"));

    let (_, list) = get(app, "/api/sequences").await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn resaving_an_executed_sequence_is_a_conflict() {
    let chain = funded_chain();
    let app = chainpilot_server::build_router(engine(chain.clone()));
    let (_, draft) = post_json(
        app.clone(),
        "/api/actions/invoke",
        json!({ "userId": "alice", "userAddress": USER, "actions": [transfer_task("1")] }),
    )
    .await;
    let (status, saved) = post_json(
        app.clone(),
        "/api/sequences",
        json!({ "userId": "alice", "sequence": draft.clone() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = saved["id"].as_str().unwrap().to_string();
    let (status, _) = post_json(
        app.clone(),
        &format!("/api/sequences/{id}/execute"),
        json!({ "walletId": "wallet-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let mut confirmed = false;
    for _ in 0..50 {
        let (_, seq) = get(app.clone(), &format!("/api/sequences/{id}")).await;
        if seq["actions"][0]["transactions"][0]["status"] == json!("CONFIRMED") {
            confirmed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(confirmed, "transaction never confirmed");

    let (status, body) = post_json(
        app.clone(),
        "/api/sequences",
        json!({ "userId": "alice", "sequence": draft }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("SEQUENCE_EXISTS"));

    let (_, seq) = get(app, &format!("/api/sequences/{id}")).await;
    assert_eq!(seq["actions"][0]["transactions"][0]["status"], json!("CONFIRMED"));
    assert!(seq["actions"][0]["transactions"][0]["hash"].is_string());
    assert_eq!(chain.broadcast_log().len(), 1);
}

#[tokio::test]
async fn malformed_sequence_id_is_bad_request() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = get(app, "/api/sequences/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));
}

#[tokio::test]
async fn execute_runs_in_background() {
    let chain = funded_chain();
    let engine = engine(chain.clone());
    let app = chainpilot_server::build_router(engine.clone());
    let saved = saved_transfer(&app).await;
    let id = saved["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        app.clone(),
        &format!("/api/sequences/{id}/execute"),
        json!({ "walletId": "wallet-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], json!("executing"));

    let mut done = false;
    for _ in 0..50 {
        let (_, seq) = get(app.clone(), &format!("/api/sequences/{id}")).await;
        if seq["actions"][0]["transactions"][0]["status"] == json!("CONFIRMED") {
            done = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(done, "transaction never confirmed");
    assert_eq!(chain.broadcast_log().len(), 1);
}

#[tokio::test]
async fn execute_unknown_sequence_is_404() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = post_json(
        app,
        &format!("/api/sequences/{}/execute", uuid::Uuid::new_v4()),
        json!({ "walletId": "wallet-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("SEQUENCE_NOT_FOUND"));
}

#[tokio::test]
async fn execute_requires_wallet() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let saved = saved_transfer(&app).await;
    let id = saved["id"].as_str().unwrap();
    let (status, _) = post_json(
        app,
        &format!("/api/sequences/{id}/execute"),
        json!({ "walletId": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reconcile_reports_settled_sequence() {
    let engine = engine(funded_chain());
    let app = chainpilot_server::build_router(engine.clone());
    let saved = saved_transfer(&app).await;
    let id: uuid::Uuid = saved["id"].as_str().unwrap().parse().unwrap();
    engine.execute(id, "wallet-1").await.unwrap();

    let (status, report) = post_json(app, &format!("/api/sequences/{id}/reconcile"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outstanding"], json!(0));
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_ends_with_final_snapshot() {
    let engine = engine(funded_chain());
    let app = chainpilot_server::build_router(engine.clone());
    let saved = saved_transfer(&app).await;
    let id: uuid::Uuid = saved["id"].as_str().unwrap().parse().unwrap();
    engine.execute(id, "wallet-1").await.unwrap();

    let req = axum::http::Request::builder()
        .uri(format!("/api/sequences/{id}/stream"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[axum::http::header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(text.matches("event: status").count(), 1);
    assert!(text.contains("\"final\":true"));
    assert!(text.contains("\"hasFailed\":false"));
}

#[tokio::test]
async fn stream_of_unknown_sequence_sends_error_event() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let req = axum::http::Request::builder()
        .uri(format!("/api/sequences/{}/stream", uuid::Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: error"));
    assert!(text.contains("SEQUENCE_NOT_FOUND"));
}

// ---------------------------------------------------------------------------
// Protocols and tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protocols_lists_registered_protocols() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = get(app.clone(), "/api/protocols").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["transfer", "symbiosis", "stryke"]);

    let req = axum::http::Request::builder()
        .uri("/api/protocols/describe")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let text = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8(text.to_vec()).unwrap().contains("## transfer"));
}

#[tokio::test]
async fn tools_list_and_execute() {
    let chain = funded_chain();
    let app = chainpilot_server::build_router(engine(chain));
    let (status, tools) = get(app.clone(), "/api/tools").await;
    assert_eq!(status, StatusCode::OK);
    assert!(tools
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["name"] == json!("chain_get_balance") && t["inputSchema"].is_object()));

    let (status, outcome) = post_json(app.clone(), "/api/tools/chain_get_balance", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["error"], json!(true));
    assert_eq!(outcome["code"], json!("VALIDATION_ERROR"));

    let (status, _) = post_json(app, "/api/tools/nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_answers_ok() {
    let app = chainpilot_server::build_router(engine(funded_chain()));
    let (status, body) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}
