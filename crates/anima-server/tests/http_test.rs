//! HTTP contract tests over the real router.
//!
//! Same gating as the engine tests: `ANIMA_TEST_DB_PASSWORD` selects a
//! live Postgres, each test isolates itself in its own schema. Requests
//! go through `tower::ServiceExt::oneshot`, so the full middleware
//! stack (envelope, X-Response-Time) is exercised without a socket.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use anima_core::config::AnimaConfig;
use anima_server::{routes, Engine};

async fn test_router(name: &str) -> Option<(Router, Arc<Engine>)> {
    let password = std::env::var("ANIMA_TEST_DB_PASSWORD").ok()?;

    let mut config = AnimaConfig::default();
    config.db.password = password;
    if let Ok(host) = std::env::var("ANIMA_TEST_DB_HOST") {
        config.db.host = host;
    }
    if let Ok(port) = std::env::var("ANIMA_TEST_DB_PORT") {
        config.db.port = port.parse().expect("ANIMA_TEST_DB_PORT must be a port");
    }
    if let Ok(db) = std::env::var("ANIMA_TEST_DB_NAME") {
        config.db.name = db;
    }
    if let Ok(user) = std::env::var("ANIMA_TEST_DB_USER") {
        config.db.user = user;
    }
    config.db.schema = format!("anima_http_{}_{}", name, std::process::id());
    config.log_level = "warn".to_string();

    let engine = Arc::new(Engine::start(config).await.expect("engine should start"));
    Some((routes::router(engine.clone()), engine))
}

async fn drop_schema(engine: &Engine) {
    let schema = engine.config.db.schema.clone();
    if let Ok(mut conn) = engine.pool.acquire().await {
        use sqlx::Executor;
        let _ = conn
            .execute(format!("DROP SCHEMA IF EXISTS {schema} CASCADE").as_str())
            .await;
    }
}

fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn add_create_duplicate_and_envelope() {
    let Some((router, engine)) = test_router("add").await else {
        return;
    };

    let body = serde_json::json!({
        "content": "the envelope wraps every response",
        "tags": ["transport"],
    });
    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/memories/add",
            body.clone(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("X-Response-Time"));
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["isDuplicate"], false);
    assert_eq!(json["data"]["memory"]["tier"], "active");
    assert!(json["meta"]["requestId"].is_string());

    // The same content again resolves as an exact duplicate with 200.
    let response = router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/memories/add", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["isDuplicate"], true);
    assert_eq!(json["data"]["exactMatch"], true);
    assert_eq!(json["data"]["memory"]["access_count"], 1);

    drop_schema(&engine).await;
}

#[tokio::test]
async fn query_reports_time_in_meta() {
    let Some((router, engine)) = test_router("query").await else {
        return;
    };

    router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/memories/add",
            serde_json::json!({ "content": "querying reports elapsed time" }),
        ))
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/memories/query",
            serde_json::json!({ "query": "elapsed time reports", "similarityThreshold": 0.2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert!(json["meta"]["queryTime"].is_number());
    assert_eq!(json["data"]["memories"].as_array().unwrap().len(), 1);

    drop_schema(&engine).await;
}

#[tokio::test]
async fn validation_and_not_found_error_codes() {
    let Some((router, engine)) = test_router("errors").await else {
        return;
    };

    // Empty content is a 400 with the typed code.
    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/memories/add",
            serde_json::json!({ "content": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    // An unknown tier is rejected before touching the database.
    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/memories/update-tier",
            serde_json::json!({
                "memoryId": uuid::Uuid::new_v4(),
                "tier": "archived",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A missing memory id maps to NOT_FOUND.
    let response = router
        .clone()
        .oneshot(get_request(&format!(
            "/api/v1/associations/network-stats?memoryId={}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    drop_schema(&engine).await;
}

#[tokio::test]
async fn bootstrap_health_and_metrics_read_back() {
    let Some((router, engine)) = test_router("meta").await else {
        return;
    };

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/memories/bootstrap?limit=10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let handshake = &json["data"]["ghostHandshake"];
    let text = handshake["promptText"].as_str().unwrap();
    assert!(text.contains("I was") || text.contains("I am"));
    assert!(text.trim().ends_with("Continue."));
    assert_eq!(json["data"]["filtering"]["boostFactor"], 2.0);

    let response = router.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["status"], "healthy");

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/meta/metrics"))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert!(json["data"]["cache"]["hitRate"].is_number());
    assert!(json["data"]["database"]["totalConnections"].is_number());

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/meta/cache-stats"))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert!(json["data"]["recommendation"].is_string());

    drop_schema(&engine).await;
}

#[tokio::test]
async fn conversation_end_records_a_reflection() {
    let Some((router, engine)) = test_router("reflect").await else {
        return;
    };

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/meta/conversation-end",
            serde_json::json!({
                "conversationId": "C-http",
                "sessionMetrics": {
                    "loadTimeMs": 80,
                    "memoriesLoaded": 10,
                    "memoriesAccessed": 9,
                    "queries": 4,
                    "resultsReturned": 12,
                    "queriesWithHits": 4,
                    "relevanceSum": 3.2,
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let reflection = &json["data"]["reflection"];
    assert_eq!(reflection["reflection_type"], "conversation_end");
    assert_eq!(reflection["metrics"]["friction"]["feel"], "smooth");
    assert!(!reflection["insights"].as_array().unwrap().is_empty());

    let response = router
        .clone()
        .oneshot(get_request(
            "/api/v1/meta/reflection?conversationId=C-http&limit=5",
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["data"]["count"], 1);

    drop_schema(&engine).await;
}
