//! Smoke tests for the core account flows used by the frontend.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use keyhaven::config::Config;
use keyhaven::security::totp;
use tower::ServiceExt;

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;

    let state = keyhaven::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    keyhaven::api::router(state).await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn post_json(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", mime::APPLICATION_JSON.as_ref());
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn get_authed(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn smoke_register_login_store_and_dashboard() {
    let app = spawn_app().await;

    let response = post_json(
        &app,
        "/api/auth/register",
        None,
        serde_json::json!({
            "username": "smokeuser",
            "email": "smoke@example.com",
            "password": "a-long-enough-password",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/api/auth/login",
        None,
        serde_json::json!({ "username": "smokeuser", "password": "a-long-enough-password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let token = json["data"]["access_token"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["membership"]["tier"], "free");

    let response = post_json(
        &app,
        "/api/keys",
        Some(&token),
        serde_json::json!({
            "provider_id": 1,
            "key_name": "Primary",
            "api_key": "sk-smoke-key-000001",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_authed(&app, "/api/user/dashboard", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["total_keys"], 1);
    assert_eq!(json["data"]["active_keys"], 1);
    assert_eq!(json["data"]["membership"]["tier"], "free");

    // Login history recorded the successful password login.
    let response = get_authed(&app, "/api/user/login-history", &token).await;
    let json = body_json(response).await;
    let history = json["data"].as_array().unwrap();
    assert!(!history.is_empty());
    assert_eq!(history[0]["status"], "success");
}

#[tokio::test]
async fn smoke_totp_enrollment_login_and_rotation() {
    let app = spawn_app().await;

    post_json(
        &app,
        "/api/auth/register",
        None,
        serde_json::json!({
            "username": "totpuser",
            "email": "totp@example.com",
            "password": "a-long-enough-password",
        }),
    )
    .await;

    let login_body =
        serde_json::json!({ "username": "totpuser", "password": "a-long-enough-password" });
    let response = post_json(&app, "/api/auth/login", None, login_body.clone()).await;
    let token = body_json(response).await["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    // Enroll: fetch a pending secret, prove possession, enable.
    let response = post_json(&app, "/api/totp/setup", Some(&token), serde_json::json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let secret = json["data"]["secret"].as_str().unwrap().to_string();
    assert_eq!(secret.len(), 32);
    assert!(
        json["data"]["enrollment_uri"]
            .as_str()
            .unwrap()
            .starts_with("otpauth://totp/Keyhaven:totpuser?secret=")
    );

    let code = totp::current_code(&secret).unwrap();
    let response = post_json(
        &app,
        "/api/totp/enable",
        Some(&token),
        serde_json::json!({ "code": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_authed(&app, "/api/totp/status", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["is_enabled"], true);

    // Password alone no longer logs in.
    let response = post_json(&app, "/api/auth/login", None, login_body.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Password plus a current code does.
    let mut with_code = login_body.clone();
    with_code["totp_code"] = serde_json::json!(totp::current_code(&secret).unwrap());
    let response = post_json(&app, "/api/auth/login", None, with_code).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    // Rotation: candidate secret, then dual-code confirmation.
    let response = post_json(&app, "/api/totp/rotate", Some(&token), serde_json::json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_secret = body_json(response).await["data"]["secret"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(new_secret, secret);

    // A wrong old code aborts the rotation and keeps the old secret.
    let response = post_json(
        &app,
        "/api/totp/rotate/confirm",
        Some(&token),
        serde_json::json!({
            "old_code": "000000",
            "new_code": totp::current_code(&new_secret).unwrap(),
            "new_secret": new_secret,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post_json(
        &app,
        "/api/totp/verify",
        Some(&token),
        serde_json::json!({ "code": totp::current_code(&secret).unwrap() }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["is_valid"], true);

    // Correct codes against both secrets commit the replacement.
    let response = post_json(
        &app,
        "/api/totp/rotate/confirm",
        Some(&token),
        serde_json::json!({
            "old_code": totp::current_code(&secret).unwrap(),
            "new_code": totp::current_code(&new_secret).unwrap(),
            "new_secret": new_secret,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/api/totp/verify",
        Some(&token),
        serde_json::json!({ "code": totp::current_code(&new_secret).unwrap() }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["is_valid"], true);

    // Disable requires password and a current code.
    let response = post_json(
        &app,
        "/api/totp/disable",
        Some(&token),
        serde_json::json!({
            "password": "a-long-enough-password",
            "code": totp::current_code(&new_secret).unwrap(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Password-only login works again.
    let response = post_json(&app, "/api/auth/login", None, login_body).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn smoke_custom_provider_lifecycle() {
    let app = spawn_app().await;

    post_json(
        &app,
        "/api/auth/register",
        None,
        serde_json::json!({
            "username": "provuser",
            "email": "prov@example.com",
            "password": "a-long-enough-password",
        }),
    )
    .await;
    let response = post_json(
        &app,
        "/api/auth/login",
        None,
        serde_json::json!({ "username": "provuser", "password": "a-long-enough-password" }),
    )
    .await;
    let token = body_json(response).await["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = post_json(
        &app,
        "/api/keys/providers",
        Some(&token),
        serde_json::json!({
            "display_name": "My Self-Hosted LLM",
            "base_url": "https://llm.internal.example.com/v1",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let provider_id = json["data"]["id"].as_i64().unwrap();
    assert_eq!(json["data"]["is_custom"], true);

    // The custom provider shows up in this user's listing.
    let response = get_authed(&app, "/api/keys/providers", &token).await;
    let json = body_json(response).await;
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["display_name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"My Self-Hosted LLM"));

    // A credential pinned to it blocks deletion until removed.
    let response = post_json(
        &app,
        "/api/keys",
        Some(&token),
        serde_json::json!({
            "provider_id": provider_id,
            "key_name": "Self-hosted key",
            "api_key": "sk-selfhosted-123456",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let key_id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/keys/providers/{provider_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/keys/{key_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/keys/providers/{provider_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
