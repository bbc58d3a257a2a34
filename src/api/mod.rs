use axum::{
    Extension, Router,
    http::HeaderValue,
    middleware,
    routing::{any, delete, get, post, put},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

pub mod admin;
mod assets;
pub mod auth;
pub mod captcha;
mod error;
pub mod keys;
mod observability;
pub mod providers;
pub mod system;
pub mod totp;
pub mod user;
mod types;
mod validation;
pub mod webhook;

pub use error::ApiError;
pub use types::*;

use tokio::sync::RwLock;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn cipher(&self) -> &crate::security::CredentialCipher {
        &self.shared.cipher
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn crate::services::AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn membership(&self) -> &crate::services::MembershipService {
        &self.shared.membership
    }

    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.shared.http_client
    }
}

pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = {
        let config = state.config().read().await;
        config.server.cors_allowed_origins.clone()
    };

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/captcha", get(captcha::get_captcha))
        // The retired fixed admin prefix answers 404 for everyone,
        // authenticated or not.
        .route("/admin", any(admin::legacy_not_found))
        .route("/admin/{*rest}", any(admin::legacy_not_found));

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .route("/webhook/payment", post(webhook::payment_webhook))
        .route("/health", get(system::health))
        .fallback(assets::serve_asset)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(observability::logging_middleware))
                .layer(middleware::from_fn(
                    observability::security_headers_middleware,
                ))
                .layer(cors_layer.allow_methods(Any).allow_headers(Any)),
        )
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Admin routes live under the per-process dynamic prefix and behind the
    // role gate; the obfuscated path is never the only barrier.
    let admin_prefix = format!("/sec/{}", state.shared.admin_path.token());

    Router::new()
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/password", put(auth::change_password))
        .route("/auth/account", delete(auth::delete_account))
        .route("/keys", get(keys::list_keys))
        .route("/keys", post(keys::create_key))
        .route("/keys/limits", get(keys::get_key_limits))
        .route("/keys/test", post(keys::test_key))
        .route("/keys/providers", get(providers::list_providers))
        .route("/keys/providers", post(providers::create_custom_provider))
        .route(
            "/keys/providers/{id}",
            delete(providers::delete_custom_provider),
        )
        .route("/keys/models", get(providers::list_models))
        .route(
            "/keys/models/{provider_id}",
            get(providers::list_provider_models),
        )
        .route("/keys/{id}", get(keys::get_key))
        .route("/keys/{id}", put(keys::update_key))
        .route("/keys/{id}", delete(keys::delete_key))
        .route("/keys/{id}/reveal", get(keys::reveal_key))
        .route("/totp/status", get(totp::get_status))
        .route("/totp/setup", post(totp::setup))
        .route("/totp/enable", post(totp::enable))
        .route("/totp/verify", post(totp::verify))
        .route("/totp/rotate", post(totp::rotate_begin))
        .route("/totp/rotate/confirm", post(totp::rotate_confirm))
        .route("/totp/disable", post(totp::disable))
        .route("/user/dashboard", get(user::get_dashboard))
        .route("/user/logs", get(user::get_logs))
        .route("/user/log-actions", get(user::get_log_actions))
        .route("/user/login-history", get(user::get_login_history))
        .route("/membership/status", get(user::get_membership_status))
        .route("/system/status", get(system::get_status))
        .route("/metrics", get(observability::get_metrics))
        .route("/admin-path", get(admin::get_admin_path))
        .nest(&admin_prefix, create_admin_router())
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

fn create_admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats/overview", get(admin::stats_overview))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", get(admin::get_user_detail))
        .route(
            "/users/{id}/role",
            put(admin::update_user_role)
                .layer::<_, std::convert::Infallible>(middleware::from_fn(admin::confirm_action_middleware))
                .layer(Extension(admin::HighRisk("update user role"))),
        )
        .route(
            "/users/{id}/status",
            put(admin::update_user_status)
                .layer::<_, std::convert::Infallible>(middleware::from_fn(admin::confirm_action_middleware))
                .layer(Extension(admin::HighRisk("disable user"))),
        )
        .route(
            "/users/{id}/membership",
            put(admin::update_user_membership)
                .layer::<_, std::convert::Infallible>(middleware::from_fn(admin::confirm_action_middleware))
                .layer(Extension(admin::HighRisk("override membership"))),
        )
        .route("/providers", get(admin::list_providers))
        .route("/providers", post(admin::create_provider))
        .route("/providers/{id}", put(admin::update_provider))
        .route("/providers/{id}/status", put(admin::update_provider_status))
        .route("/models", get(admin::list_models))
        .route("/models", post(admin::create_model))
        .route("/models/{id}", put(admin::update_model))
        .route(
            "/models/{id}",
            delete(admin::delete_model)
                .layer::<_, std::convert::Infallible>(middleware::from_fn(admin::confirm_action_middleware))
                .layer(Extension(admin::HighRisk("delete model"))),
        )
        .route_layer(middleware::from_fn(admin::require_admin_middleware))
}
