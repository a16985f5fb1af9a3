use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use migration::MigratorTrait;
use serde_json::{Value, json};
use server::{ServerState, router};
use tower::ServiceExt;

async fn state() -> ServerState {
    let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = engine::Engine::builder().database(db).build();
    ServerState {
        engine: Arc::new(engine),
    }
}

async fn send(state: &ServerState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
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

fn block_operation(memo: &str) -> Value {
    json!({
        "type": "transfer",
        "memo": memo,
        "metadata": {"operation": "BLOCK"},
        "entries": [
            {"book_id": "3", "asset_id": "btc", "value": "-1"},
            {"book_id": "4", "asset_id": "btc", "value": "1"},
        ],
    })
}

#[tokio::test]
async fn post_operation_applies_balances() {
    let state = state().await;

    let (status, body) = send(
        &state,
        post_json("/api/v1/operations", block_operation("block-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation"]["memo"], "block-1");
    assert!(body["operation"]["id"].as_str().is_some());

    let (status, body) = send(
        &state,
        get("/api/v1/books/4/balance?asset_id=btc&operation_type=BLOCK"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balances"][0]["balance"], "1");

    // No operation_type means the OVERALL aggregate.
    let (status, body) = send(&state, get("/api/v1/books/3/balance?asset_id=btc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balances"][0]["operation_type"], "OVERALL");
    assert_eq!(body["balances"][0]["balance"], "-1");
}

#[tokio::test]
async fn post_operation_without_metadata_is_unprocessable() {
    let state = state().await;
    let mut payload = block_operation("block-1");
    payload.as_object_mut().unwrap().remove("metadata");

    let (status, body) = send(&state, post_json("/api/v1/operations", payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("metadata"));
}

#[tokio::test]
async fn post_operation_without_operation_key_is_unprocessable() {
    let state = state().await;
    let mut payload = block_operation("block-1");
    payload["metadata"] = json!({"origin": "api"});

    let (status, _body) = send(&state, post_json("/api/v1/operations", payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_operation_by_memo() {
    let state = state().await;
    send(
        &state,
        post_json("/api/v1/operations", block_operation("block-1")),
    )
    .await;

    let (status, body) = send(&state, get("/api/v1/operations?memo=block-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation"]["memo"], "block-1");
    assert_eq!(body["operation"]["entries"].as_array().unwrap().len(), 2);

    let (status, _body) = send(&state, get("/api/v1/operations?memo=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _body) = send(&state, get("/api/v1/operations")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn books_roundtrip() {
    let state = state().await;

    let (status, body) = send(
        &state,
        post_json("/api/v1/books", json!({"name": "assets:hot"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "create successful");
    let book_id = body["book"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &state,
        post_json(
            "/api/v1/books",
            json!({"name": "assets:hot", "metadata": {"custodian": "cold"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "update successful");

    let (status, body) = send(&state, get(&format!("/api/v1/books/{book_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["name"], "assets:hot");

    let (status, body) = send(
        &state,
        get(&format!("/api/v1/books/{book_id}?balance=true")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["balances"].as_array().unwrap().is_empty());

    let (status, _body) = send(&state, get("/api/v1/books/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
