use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aether_identity::{Error, RetryPolicy, Transport};
use reqwest::Method;
use serde_json::{json, Value as JsonValue};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer, system_key: Option<&str>, attempts: u32) -> Transport {
    Transport::new(
        &server.uri().parse().unwrap(),
        "test-client",
        system_key.map(str::to_string),
        RetryPolicy::new(attempts, Duration::ZERO),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/userinfo"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "message": "maintenance" })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let err = transport(&server, None, 3)
        .get::<JsonValue>("/api/v1/userinfo", Some("tok"))
        .await
        .unwrap_err();

    match err {
        Error::Server(api) => {
            assert_eq!(api.status, 503);
            assert_eq!(api.code, "SERVER_ERROR");
            assert_eq!(api.message, "maintenance");
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/userinfo"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u1" })))
        .expect(1)
        .mount(&server)
        .await;

    let body: JsonValue = transport(&server, None, 3)
        .get("/api/v1/userinfo", Some("tok"))
        .await
        .unwrap();

    assert_eq!(body["id"], "u1");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "not found" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server, None, 5)
        .get::<JsonValue>("/api/v1/missing", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api(_)));
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), "UNKNOWN_ERROR");
    assert_eq!(err.api_error().unwrap().message, "not found");
}

#[tokio::test]
async fn test_error_code_overrides_status_and_keeps_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("x-request-id", "req-42")
                .set_body_json(json!({ "code": "TOTP_REQUIRED", "message": "code needed" })),
        )
        .mount(&server)
        .await;

    let err = transport(&server, None, 3)
        .post::<JsonValue>("/api/v1/auth/login", Some(&json!({})), None)
        .await
        .unwrap_err();

    let Error::TotpRequired(api) = err else {
        panic!("expected TOTP required");
    };
    assert_eq!(api.status, 401);
    assert_eq!(api.request_id.as_deref(), Some("req-42"));
    assert_eq!(api.details["code"], "TOTP_REQUIRED");
}

#[tokio::test]
async fn test_access_token_is_bearer_and_client_id_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("X-Client-ID", "test-client"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let _: JsonValue = transport(&server, Some("sys-key"), 1)
        .get("/api/v1/users/me", Some("user-token"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_system_key_header_without_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/devices/status"))
        .and(header("X-System-Key", "sys-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": true })))
        .expect(1)
        .mount(&server)
        .await;

    let received = transport(&server, Some("sys-key"), 1)
        .get::<JsonValue>("/api/v1/devices/status", None)
        .await
        .unwrap();
    assert_eq!(received["available"], true);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_system_key_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/register"))
        .and(header("Authorization", "Bearer sys-key"))
        .and(body_json(json!({ "email": "a@b.c" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let body: JsonValue = transport(&server, Some("sys-key"), 1)
        .post_as_system("/api/v1/auth/register", Some(&json!({ "email": "a@b.c" })))
        .await
        .unwrap();
    assert_eq!(body["success"], true);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("x-system-key").is_none());
}

#[tokio::test]
async fn test_empty_success_body_is_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/eid"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let body = transport(&server, None, 1)
        .request(Method::DELETE, "/api/v1/eid", None, Some("tok"), false)
        .await
        .unwrap();

    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let transport = Transport::new(
        &"http://127.0.0.1:9".parse().unwrap(),
        "test-client",
        None,
        RetryPolicy::new(2, Duration::ZERO),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = transport
        .get::<JsonValue>("/api/v1/userinfo", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Network(_)));
    assert_eq!(err.code(), "NETWORK_ERROR");
}

/// Accepts connections and drops them immediately, counting each one.
async fn dropping_listener() -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (format!("http://{addr}"), accepted)
}

#[tokio::test(start_paused = true)]
async fn test_connectivity_failures_back_off_exponentially() {
    let (base, accepted) = dropping_listener().await;
    let delay = Duration::from_millis(100);
    let transport = Transport::new(
        &base.parse().unwrap(),
        "test-client",
        None,
        RetryPolicy::new(3, delay),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_http_client(reqwest::Client::new());

    let started = tokio::time::Instant::now();
    let err = transport
        .get::<JsonValue>("/api/v1/userinfo", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Network(_)));
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    // d after the first attempt, 2d after the second, nothing after the last
    assert_eq!(started.elapsed(), delay + delay * 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_does_not_sleep() {
    let (base, accepted) = dropping_listener().await;
    let transport = Transport::new(
        &base.parse().unwrap(),
        "test-client",
        None,
        RetryPolicy::new(1, Duration::from_secs(10)),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_http_client(reqwest::Client::new());

    let started = tokio::time::Instant::now();
    let err = transport
        .get::<JsonValue>("/api/v1/userinfo", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Network(_)));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}
