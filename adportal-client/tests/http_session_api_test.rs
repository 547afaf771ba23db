//! HTTP session API tests against an in-process fake backend

use adportal_client::{ApiClientConfig, HttpSessionApi};
use adportal_core::{ChangePasswordRequest, ErrorKind, LoginRequest, SessionApi};
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const SESSION: &str = "sess-alice";

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        == Some(SESSION)
}

fn rejected() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "Session expired"})),
    )
}

async fn login(Json(body): Json<Value>) -> impl IntoResponse {
    if body["username"] == "alice" && body["password"] == "pw" {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "sessionId": SESSION,
                "user": {"username": "alice", "displayName": "Alice"},
                "expiresIn": 1800,
                "rememberMeEcho": body["rememberMe"],
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Invalid username or password"})),
        )
    }
}

async fn validate(headers: HeaderMap) -> impl IntoResponse {
    if !has_session(&headers) {
        return rejected();
    }
    (
        StatusCode::OK,
        Json(json!({"success": true, "data": {"user": {"username": "alice"}, "expiresIn": 1200}})),
    )
}

async fn refresh(headers: HeaderMap) -> impl IntoResponse {
    if !has_session(&headers) {
        return rejected();
    }
    (StatusCode::OK, Json(json!({"success": true, "expiresIn": 1800})))
}

async fn logout() -> impl IntoResponse {
    Json(json!({"success": true}))
}

async fn session_info() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream exploded")
}

async fn profile(headers: HeaderMap) -> impl IntoResponse {
    if !has_session(&headers) {
        return rejected();
    }
    (
        StatusCode::OK,
        Json(json!({"success": true, "data": {"username": "alice", "email": "alice@example.com", "title": "Engineer"}})),
    )
}

async fn account_status(headers: HeaderMap) -> impl IntoResponse {
    if !has_session(&headers) {
        return rejected();
    }
    (
        StatusCode::OK,
        Json(json!({"success": true, "data": {"enabled": true, "locked": false, "lastLogon": "2026-10-01T08:00:00Z"}})),
    )
}

async fn change_password(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !has_session(&headers) {
        return rejected();
    }
    if body["currentPassword"] != "pw" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "Current password is incorrect"})),
        );
    }
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/portal/api/auth/login", post(login))
        .route("/portal/api/auth/logout", post(logout))
        .route("/portal/api/auth/validate", get(validate))
        .route("/portal/api/auth/refresh", post(refresh))
        .route("/portal/api/auth/session", get(session_info))
        .route("/portal/api/user/profile", get(profile))
        .route("/portal/api/user/account-status", get(account_status))
        .route("/portal/api/user/change-password", post(change_password));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake backend");
    let address = listener.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Fake backend crashed");
    });

    format!("http://{}/portal", address)
}

async fn client() -> HttpSessionApi {
    let base_url = spawn_backend().await;
    HttpSessionApi::new(ApiClientConfig::new(base_url).with_timeout(5)).unwrap()
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let api = client().await;

    let response = api
        .login(&LoginRequest::new("alice", "pw", true))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.session_id.as_deref(), Some(SESSION));
    assert_eq!(response.expiry.expires_in, Some(1800.0));
    assert_eq!(response.user.unwrap().display_label(), "Alice");

    let error = api
        .login(&LoginRequest::new("alice", "wrong", false))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Auth);
    assert_eq!(error.user_message(), "Invalid username or password");
}

#[tokio::test]
async fn test_session_bound_endpoints_send_session_header() {
    let api = client().await;

    let validated = api.validate_session(SESSION).await.unwrap();
    assert_eq!(validated.user().unwrap().username, "alice");
    assert_eq!(validated.expiry().unwrap().expires_in, Some(1200.0));

    let refreshed = api.refresh_session(SESSION).await.unwrap();
    assert!(refreshed.success);

    let profile = api.get_profile(SESSION).await.unwrap();
    assert_eq!(
        profile.data.unwrap().email.as_deref(),
        Some("alice@example.com")
    );

    let status = api.get_account_status(SESSION).await.unwrap();
    let status = status.data.unwrap();
    assert!(status.enabled);
    assert!(!status.locked);

    assert!(api.logout(SESSION).await.unwrap().success);
}

#[tokio::test]
async fn test_rejected_session_is_auth_error() {
    let api = client().await;

    let error = api.validate_session("stale").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Auth);
    assert_eq!(error.user_message(), "Session expired");
}

#[tokio::test]
async fn test_non_json_response_is_network_error() {
    let api = client().await;

    let error = api.session_info(SESSION).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_change_password_failure_keeps_server_message() {
    let api = client().await;

    let request = ChangePasswordRequest {
        current_password: "nope".to_string(),
        new_password: "N3w-Passw0rd!".to_string(),
    };
    let response = api.change_password(SESSION, &request).await.unwrap();
    assert!(!response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("Current password is incorrect")
    );

    let request = ChangePasswordRequest {
        current_password: "pw".to_string(),
        new_password: "N3w-Passw0rd!".to_string(),
    };
    assert!(api.change_password(SESSION, &request).await.unwrap().success);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let api = HttpSessionApi::new(ApiClientConfig::new(format!("http://{}", address))).unwrap();
    let error = api
        .login(&LoginRequest::new("alice", "pw", false))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Network);
}
