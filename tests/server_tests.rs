// tests for the http api

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sqlguard::{Datastore, Server};
use tower::ServiceExt;

async fn call(datastore: Datastore, request: Request<Body>) -> (StatusCode, Value) {
    let response = Server::router(datastore).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = call(Datastore::Redshift, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["datastore"], "redshift");
}

#[tokio::test]
async fn test_validate_accepts() {
    let (status, body) = call(
        Datastore::Snowflake,
        post(
            "/validate",
            json!({ "sql": "SELECT account FROM panther_logs.public.t WHERE p_occurs_since('1 d')" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(
        body["processed_sql"],
        "SELECT \"account\" FROM panther_logs.public.t WHERE p_occurs_since('1 d')"
    );
}

#[tokio::test]
async fn test_validate_rejects() {
    let (status, body) = call(
        Datastore::Snowflake,
        post("/validate", json!({ "sql": "SELECT * FROM panther_logs.public.t" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().contains("time filter"));
    assert!(body["processed_sql"].is_null());
}

#[tokio::test]
async fn test_validate_flags() {
    let (status, body) = call(
        Datastore::Snowflake,
        post(
            "/validate",
            json!({ "sql": "SELECT 1", "require_time_filter": false, "read_only": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed_sql"], "SELECT 1");
}

#[tokio::test]
async fn test_normalize() {
    let (status, body) = call(
        Datastore::Snowflake,
        post("/normalize", json!({ "name": "AWS.CloudTrail" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "AWS.CloudTrail");
    assert_eq!(body["normalized"], "AWS_CloudTrail");
}

#[tokio::test]
async fn test_reserved_words() {
    let (_, body) = call(Datastore::Redshift, get("/reserved-words")).await;
    assert_eq!(body["datastore_type"], "redshift");
    let words = body["quotable_reserved_words"].as_array().unwrap();
    assert!(words.contains(&json!("DELTA")));
    assert!(!words.contains(&json!("QUALIFY")));
}

#[tokio::test]
async fn test_syntax_help() {
    let (_, body) = call(Datastore::Snowflake, get("/syntax-help")).await;
    assert_eq!(body["datastore_type"], "snowflake");
    assert!(body["date_functions"].as_str().unwrap().contains("DATEADD"));
}
