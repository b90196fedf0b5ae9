//! End-to-end tests for the `/api/*` relay.

use axum::body::Bytes;
use axum::http::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use platform_edge::config::BackendConfig;
use platform_edge::proxy::{ProxyForwarder, ProxyMethod, RequestDescriptor};

mod common;
use common::MockResponse;

const FORWARDED: [&str; 6] = ["authorization", "content-length", "content-type", "cookie", "host", "origin"];

#[tokio::test]
async fn test_only_allow_listed_headers_reach_backend() {
    let (backend, log) = common::start_mock_backend(MockResponse::json(200, "OK", json!({"success": true}))).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("http://{}/api/wallet/deposit", edge))
        .header("Content-Type", "application/json")
        .header("Authorization", "Bearer at1")
        .header("Cookie", "access_token=at1")
        .header("Cookie", "NEXT_LOCALE=ru")
        .header("Origin", "http://evil.example")
        .header("X-Forwarded-For", "10.0.0.1")
        .header("User-Agent", "integration-test")
        .header("Accept-Language", "ru")
        .header("X-Custom", "1")
        .body(r#"{"amount": 100}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = log.last().unwrap();
    for name in seen.header_names() {
        assert!(FORWARDED.contains(&name.as_str()), "unexpected header forwarded: {}", name);
    }
    assert_eq!(seen.header("authorization"), Some("Bearer at1"));
    assert_eq!(seen.header("cookie"), Some("access_token=at1; NEXT_LOCALE=ru"));
    assert_eq!(seen.header("origin"), Some(format!("http://{}", edge).as_str()));
    assert_eq!(seen.target, "/api/wallet/deposit");
    assert_eq!(seen.json(), json!({"amount": 100}));

    shutdown.trigger();
}

#[tokio::test]
async fn test_every_set_cookie_is_relayed_separately() {
    let response = MockResponse::json(200, "OK", json!({"success": true}))
        .header("Set-Cookie", "sid=s1; Path=/; HttpOnly")
        .header("Set-Cookie", "csrf=c1; Path=/")
        .header("Set-Cookie", "theme=dark; Expires=Wed, 21 Oct 2026 07:28:00 GMT");
    let (backend, _log) = common::start_mock_backend(response).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let res = reqwest::get(format!("http://{}/api/auth/me", edge)).await.unwrap();
    let cookies: Vec<&str> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(
        cookies,
        vec![
            "sid=s1; Path=/; HttpOnly",
            "csrf=c1; Path=/",
            "theme=dark; Expires=Wed, 21 Oct 2026 07:28:00 GMT",
        ]
    );
    assert!(res.headers().get("x-request-id").is_some());

    shutdown.trigger();
}

#[tokio::test]
async fn test_status_and_body_relayed_unchanged() {
    let response = MockResponse::json(
        409,
        "Conflict",
        json!({"success": false, "error": {"code": "EMAIL_TAKEN", "message": "Email already registered"}}),
    );
    let (backend, log) = common::start_mock_backend(response).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let res = reqwest::Client::new()
        .get(format!("http://{}/api/investments?page=2&tag=a&tag=b", edge))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);
    assert_eq!(res.headers().get_all("set-cookie").iter().count(), 0);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "EMAIL_TAKEN");

    let seen = log.last().unwrap();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.target, "/api/investments?page=2&tag=a&tag=b");
    assert!(seen.body.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_get_is_idempotent_through_proxy() {
    let (backend, log) = common::start_mock_backend(MockResponse::json(200, "OK", json!({"n": 1}))).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let url = format!("http://{}/api/plans", edge);
    let first = reqwest::get(&url).await.unwrap().text().await.unwrap();
    let second = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(log.count_path("/api/plans"), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_json_rejected_without_forwarding() {
    let (backend, log) = common::start_mock_backend(MockResponse::json(200, "OK", json!({}))).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let res = reqwest::Client::new()
        .post(format!("http://{}/api/auth/login", edge))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_JSON_BODY");
    assert!(log.all().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_yields_proxy_error() {
    // Grab a free port, then close it so nothing is listening.
    let spare = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = spare.local_addr().unwrap();
    drop(spare);

    let (edge, shutdown) = common::start_edge(dead).await;
    let res = reqwest::get(format!("http://{}/api/auth/me", edge)).await.unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "PROXY_ERROR");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_slow_backend_yields_proxy_error() {
    let (backend, log) = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        MockResponse::json(200, "OK", json!({"success": true}))
    })
    .await;
    let (edge, shutdown) = common::start_edge_with(backend, |c| {
        c.backend.request_timeout_secs = 1;
        c.timeouts.request_secs = 5;
    })
    .await;

    let started = std::time::Instant::now();
    let res = reqwest::get(format!("http://{}/api/auth/me", edge)).await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(started.elapsed() < Duration::from_secs(3));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "PROXY_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("timed out"));
    assert_eq!(log.count_path("/api/auth/me"), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_paths_outside_prefix_are_not_found() {
    let (backend, log) = common::start_mock_backend(MockResponse::json(200, "OK", json!({}))).await;
    let (edge, shutdown) = common::start_edge(backend).await;

    let res = reqwest::get(format!("http://{}/dashboard", edge)).await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let health = reqwest::get(format!("http://{}/healthz", edge)).await.unwrap();
    assert_eq!(health.status(), 200);
    assert!(log.all().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (backend, log) = common::start_mock_backend(MockResponse::json(200, "OK", json!({}))).await;
    let (edge, shutdown) = common::start_edge_with(backend, |c| c.security.max_body_size = 16).await;

    let res = reqwest::Client::new()
        .put(format!("http://{}/api/profile", edge))
        .header("Content-Type", "text/plain")
        .body("x".repeat(64))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);
    assert!(log.all().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_forwarder_keeps_custom_reason_phrase() {
    let response = MockResponse::json(202, "Deposit Queued", json!({"success": true}));
    let (backend, log) = common::start_mock_backend(response).await;

    let forwarder = ProxyForwarder::new(&BackendConfig {
        origin: format!("http://{}", backend),
        ..BackendConfig::default()
    });
    let mut request = RequestDescriptor::new(ProxyMethod::Post, "/wallet/deposit");
    request
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    request.headers.append(COOKIE, HeaderValue::from_static("a=1"));
    request.body = Some(Bytes::from_static(b"{\"amount\":  5}"));

    let resp = forwarder.forward(request).await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.status_text, "Deposit Queued");
    assert_eq!(resp.headers.get(CONTENT_TYPE).unwrap(), "application/json");

    let seen = log.last().unwrap();
    assert_eq!(seen.body, br#"{"amount":5}"#.to_vec());
    assert!(seen.header("origin").is_none());
}
