use axum::{
    Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::security::tokens;
use crate::services::auth_service::{
    ClientMeta, LoginRequest, LoginResult, RegisterRequest, UserInfo,
};

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// The authenticated caller, attached as a request extension by
/// [`auth_middleware`]. Role comes from the database, not the token, so a
/// revoked admin loses access as soon as the row changes.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub role: String,
}

impl CurrentUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Bearer-token authentication for every protected route.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        return Err(ApiError::unauthorized());
    };

    let secret = {
        let config = state.config().read().await;
        config.security.master_secret.clone()
    };

    let Some(claims) = tokens::verify_access_token(token, secret.as_bytes()) else {
        return Err(ApiError::unauthorized());
    };

    let user = state
        .store()
        .get_user_by_id(claims.uid)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(ApiError::unauthorized)?;

    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    tracing::Span::current().record("user_id", user.username.as_str());

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
        role: user.role,
    });

    Ok(next.run(request).await)
}

/// Client metadata for audit trails. Forwarded headers are best-effort;
/// request bodies are never captured.
#[must_use]
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let ip_address = headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("X-Real-IP")
                .and_then(|h| h.to_str().ok())
                .map(ToString::to_string)
        });

    let user_agent = headers
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(|v| v.chars().take(500).collect());

    ClientMeta {
        ip_address,
        user_agent,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let client = client_meta(&headers);
    let user = state.auth_service().register(payload, client).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResult>>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let client = client_meta(&headers);
    let result = state.auth_service().login(payload, client).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/auth/me
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let info = state.auth_service().get_user_info(current.id).await?;
    Ok(Json(ApiResponse::success(info)))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; logout just leaves an audit record.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let client = client_meta(&headers);
    state
        .store()
        .log_audit(
            crate::db::AuditEntry::success("logout")
                .by(current.id, &current.username)
                .on("USER", Some(current.id), &current.username)
                .from_client(client.ip_address, client.user_agent),
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to record logout: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Logged out".to_string(),
    })))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .change_password(
            current.id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    tracing::info!("Password changed for user: {}", current.username);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

/// DELETE /api/auth/account
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .delete_account(current.id, &payload.password)
        .await?;

    tracing::info!("Account deleted: {}", current.username);

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Account deleted".to_string(),
    })))
}

/// Convenience used by admin handlers to reject non-admin callers that
/// reached a privileged route. The obfuscated path is never the sole gate.
pub fn require_admin(current: &CurrentUser) -> Result<(), ApiError> {
    if current.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Administrator role required"))
    }
}
