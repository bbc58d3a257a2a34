use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use keyhaven::config::Config;
use tower::ServiceExt;

/// Bootstrap admin credentials seeded by the initial migration.
const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "password";

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A single pooled connection keeps the in-memory database shared.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;

    let state = keyhaven::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    keyhaven::api::router(state).await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", mime::APPLICATION_JSON.as_ref())
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> axum::response::Response {
    post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "username": username, "password": password }),
    )
    .await
}

async fn login_token(app: &Router, username: &str, password: &str) -> String {
    let response = login(app, username, password).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["data"]["access_token"].as_str().unwrap().to_string()
}

async fn register_user(app: &Router, username: &str) -> i64 {
    let response = post_json(
        app,
        "/api/auth/register",
        serde_json::json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "correct-horse-battery",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"]["id"].as_i64().unwrap()
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
async fn test_health() {
    let app = spawn_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_required() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/keys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_authed(&app, "/api/keys", "not-a-real-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_and_me() {
    let app = spawn_app().await;

    let token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let response = get_authed(&app, "/api/auth/me", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["username"], "admin");
    assert_eq!(json["data"]["role"], "admin");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = spawn_app().await;

    let response = login(&app, ADMIN_USERNAME, "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lockout_after_failed_attempts() {
    let app = spawn_app().await;
    register_user(&app, "lockme").await;

    for _ in 0..4 {
        let response = login(&app, "lockme", "wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // The fifth failure crosses the threshold and opens the window.
    let response = login(&app, "lockme", "wrong").await;
    assert_eq!(response.status(), StatusCode::LOCKED);

    // Correct credentials do not bypass an open lockout window.
    let response = login(&app, "lockme", "correct-horse-battery").await;
    assert_eq!(response.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = spawn_app().await;

    let response = post_json(
        &app,
        "/api/auth/register",
        serde_json::json!({
            "username": "shortpw",
            "email": "shortpw@example.com",
            "password": "short",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    register_user(&app, "taken").await;
    let response = post_json(
        &app,
        "/api/auth/register",
        serde_json::json!({
            "username": "taken",
            "email": "other@example.com",
            "password": "correct-horse-battery",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_captcha_endpoint() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/captcha")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["data"]["captcha_token"].is_string());
    assert!(
        json["data"]["captcha_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml")
    );
}

#[tokio::test]
async fn test_keys_crud_with_preview_and_reveal() {
    let app = spawn_app().await;
    let token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/keys")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "provider_id": 1,
                        "key_name": "My OpenAI Key",
                        "api_key": "sk-test-1234567890",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let key_id = json["data"]["id"].as_i64().unwrap();
    assert_eq!(json["data"]["key_preview"], "sk-t...7890");
    assert_eq!(json["data"]["status"], "active");
    // The plaintext must not appear anywhere in the listing response.
    assert!(!json.to_string().contains("sk-test-1234567890"));

    let response = get_authed(&app, "/api/keys", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let response = get_authed(&app, &format!("/api/keys/{key_id}/reveal"), &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["api_key"], "sk-test-1234567890");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/keys/{key_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "key_name": "Renamed", "status": "inactive" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["key_name"], "Renamed");
    assert_eq!(json["data"]["status"], "inactive");

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

    let response = get_authed(&app, &format!("/api/keys/{key_id}"), &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_key_name_conflict() {
    let app = spawn_app().await;
    let token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    for expected in [StatusCode::OK, StatusCode::CONFLICT] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/keys")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "provider_id": 1,
                            "key_name": "Duplicate",
                            "api_key": "sk-whatever-000111",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn test_legacy_admin_path_is_gone() {
    let app = spawn_app().await;
    let token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    // 404 without auth, and 404 even for a real admin.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get_authed(&app, "/api/admin/users", &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get_authed(&app, "/api/admin", &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_path_discovery_and_role_gate() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    register_user(&app, "plainuser").await;
    let user_token = login_token(&app, "plainuser", "correct-horse-battery").await;

    // Discovery endpoint is admin-only.
    let response = get_authed(&app, "/api/admin-path", &user_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = get_authed(&app, "/api/admin-path", &admin_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let admin_path = json["data"]["admin_path"].as_str().unwrap().to_string();
    assert_eq!(admin_path.len(), 16);

    // The live prefix works for admins only.
    let overview = format!("/api/sec/{admin_path}/stats/overview");
    let response = get_authed(&app, &overview, &admin_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["total_users"].as_u64().unwrap() >= 2);

    let response = get_authed(&app, &overview, &user_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A wrong token under the same shape of path is simply absent.
    let response = get_authed(
        &app,
        "/api/sec/abcdefabcdefabcd/stats/overview",
        &admin_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_paths_differ_between_processes() {
    let app_a = spawn_app().await;
    let app_b = spawn_app().await;

    let token_a = login_token(&app_a, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let token_b = login_token(&app_b, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let path_a = body_json(get_authed(&app_a, "/api/admin-path", &token_a).await).await["data"]
        ["admin_path"]
        .as_str()
        .unwrap()
        .to_string();
    let path_b = body_json(get_authed(&app_b, "/api/admin-path", &token_b).await).await["data"]
        ["admin_path"]
        .as_str()
        .unwrap()
        .to_string();

    assert_ne!(path_a, path_b);
}

#[tokio::test]
async fn test_high_risk_requires_confirm_header() {
    let app = spawn_app().await;
    let admin_token = login_token(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let user_id = register_user(&app, "promoteme").await;

    let admin_path = body_json(get_authed(&app, "/api/admin-path", &admin_token).await).await
        ["data"]["admin_path"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/sec/{admin_path}/users/{user_id}/role");
    let payload = serde_json::json!({ "role": "admin" }).to_string();

    // No confirmation header: rejected before the handler runs.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&uri)
                .header("Authorization", format!("Bearer {admin_token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&uri)
                .header("Authorization", format!("Bearer {admin_token}"))
                .header("X-Confirm-Action", "true")
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_authed(&app, &format!("/api/sec/{admin_path}/users/{user_id}"), &admin_token)
        .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["role"], "admin");
}

#[tokio::test]
async fn test_payment_webhook_updates_membership() {
    let app = spawn_app().await;
    let user_id = register_user(&app, "subscriber").await;

    // Development instance without a webhook token: signature is skipped.
    let response = post_json(
        &app,
        "/webhook/payment",
        serde_json::json!({
            "ec": 200,
            "data": {
                "order": {
                    "out_trade_no": "202608070001",
                    "remark": format!("user_{user_id}"),
                    "month": 1,
                    "total_amount": "19.00",
                    "status": 2,
                }
            },
            "sign": "",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["tier"], "basic");

    let token = login_token(&app, "subscriber", "correct-horse-battery").await;
    let response = get_authed(&app, "/api/membership/status", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["tier"], "basic");
    assert_eq!(json["data"]["is_active"], true);

    // An amount below every tier threshold is ignored.
    let response = post_json(
        &app,
        "/webhook/payment",
        serde_json::json!({
            "ec": 200,
            "data": {
                "order": {
                    "out_trade_no": "202608070002",
                    "remark": format!("user_{user_id}"),
                    "month": 1,
                    "total_amount": "1.00",
                    "status": 2,
                }
            },
            "sign": "",
        }),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["status"], "ignored");
}

#[tokio::test]
async fn test_free_tier_key_quota() {
    let app = spawn_app().await;
    register_user(&app, "quotauser").await;
    let token = login_token(&app, "quotauser", "correct-horse-battery").await;

    for i in 0..5 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/keys")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "provider_id": 1,
                            "key_name": format!("Key {i}"),
                            "api_key": format!("sk-quota-test-{i:04}"),
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The sixth credential exceeds the free quota.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/keys")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "provider_id": 1,
                        "key_name": "One too many",
                        "api_key": "sk-quota-test-0005",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = get_authed(&app, "/api/keys/limits", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["current_count"], 5);
    assert_eq!(json["data"]["limit"], 5);
    assert_eq!(json["data"]["can_add"], false);
}

#[tokio::test]
async fn test_blocked_console_guesses() {
    let app = spawn_app().await;

    for path in ["/admin", "/admin.html", "/administrator", "/console"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path}");
    }
}
