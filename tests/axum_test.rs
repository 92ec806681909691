#![cfg(feature = "axum")]

use std::time::Duration;

use aether_identity::server::axum::{
    require_auth, require_context, require_mfa, require_permissions, require_roles,
    AuthLayerState, AuthUser,
};
use aether_identity::server::{IdentityServer, MfaPolicy, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn identity_service() -> MockServer {
    let server = MockServer::start().await;
    let users = [
        ("admin-token", json!({ "id": "a1", "email": "admin@example.com", "roles": ["admin"], "permissions": ["users:read"], "mfaVerified": true, "context": "admin" })),
        ("unverified-admin", json!({ "id": "a2", "email": "admin2@example.com", "roles": ["admin"], "mfaVerified": false, "context": "admin" })),
        ("user-token", json!({ "id": "u1", "email": "user@example.com", "roles": ["viewer"] })),
    ];
    for (token, body) in users {
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/validate"))
            .and(header("Authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/validate"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .mount(&server)
        .await;
    server
}

fn state(server: &MockServer) -> AuthLayerState {
    let config = ServerConfig::new(server.uri().parse().unwrap(), "api-server")
        .with_mfa_required(MfaPolicy::Contexts(vec!["admin".into()]))
        .with_timeout(Duration::from_secs(5));
    AuthLayerState::from(&IdentityServer::new(config).unwrap())
}

fn app(state: AuthLayerState) -> Router {
    let admin = Router::new()
        .route("/users", get(|| async { "users" }))
        .route_layer(from_fn_with_state(state.clone(), require_context("admin")))
        .route_layer(from_fn_with_state(state.clone(), require_mfa))
        .route_layer(from_fn_with_state(state.clone(), require_roles(["admin"])));

    let reports = Router::new()
        .route("/summary", get(|| async { "reports" }))
        .route_layer(from_fn_with_state(
            state.clone(),
            require_permissions(["users:read"]),
        ));

    Router::new()
        .nest("/admin", admin)
        .nest("/reports", reports)
        .route(
            "/me",
            get(|AuthUser(user): AuthUser| async move { user.email }),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .route(
            "/hello",
            get(|user: Option<AuthUser>| async move {
                user.map_or_else(|| "guest".to_string(), |u| u.email.clone())
            }),
        )
        .with_state(state)
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_missing_token_is_401_json() {
    let server = identity_service().await;
    let request = Request::builder().uri("/me").body(Body::empty()).unwrap();

    let (status, body) = call(app(state(&server)), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "AUTHENTICATION_FAILED");
    assert_eq!(body["message"], "Authentication required");
}

#[tokio::test]
async fn test_invalid_token_is_401() {
    let server = identity_service().await;
    let (status, body) = call(app(state(&server)), get_with_token("/me", "forged")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_authenticated_user_reaches_handler() {
    let server = identity_service().await;
    let (status, body) = call(app(state(&server)), get_with_token("/me", "user-token")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user@example.com");
}

#[tokio::test]
async fn test_cookie_is_used_without_header() {
    let server = identity_service().await;
    let request = Request::builder()
        .uri("/me")
        .header("Cookie", "theme=dark; aether_token=user-token")
        .body(Body::empty())
        .unwrap();

    let (status, body) = call(app(state(&server)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user@example.com");
}

#[tokio::test]
async fn test_role_guard_forbids_other_roles() {
    let server = identity_service().await;
    let (status, body) =
        call(app(state(&server)), get_with_token("/admin/users", "user-token")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "AUTHORIZATION_FAILED");
}

#[tokio::test]
async fn test_admin_passes_every_guard() {
    let server = identity_service().await;
    let (status, body) =
        call(app(state(&server)), get_with_token("/admin/users", "admin-token")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "users");
}

#[tokio::test]
async fn test_mfa_guard_rejects_unverified_admin() {
    let server = identity_service().await;
    let (status, body) = call(
        app(state(&server)),
        get_with_token("/admin/users", "unverified-admin"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "MFA_REQUIRED");
}

#[tokio::test]
async fn test_permission_guard() {
    let server = identity_service().await;

    let (status, _) =
        call(app(state(&server)), get_with_token("/reports/summary", "admin-token")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        call(app(state(&server)), get_with_token("/reports/summary", "user-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_optional_user_extractor() {
    let server = identity_service().await;

    let anonymous = Request::builder().uri("/hello").body(Body::empty()).unwrap();
    let (status, body) = call(app(state(&server)), anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "guest");

    let (status, body) =
        call(app(state(&server)), get_with_token("/hello", "user-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user@example.com");
}
