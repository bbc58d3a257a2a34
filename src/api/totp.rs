//! TOTP lifecycle endpoints: status, enrollment, step-up verification,
//! dual-code rotation, and disable.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::auth_service::{TotpEnrollment, TotpStatus};

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct RotateConfirmRequest {
    pub old_code: String,
    pub new_code: String,
    pub new_secret: String,
}

#[derive(Deserialize)]
pub struct DisableRequest {
    pub password: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub is_valid: bool,
}

/// GET /api/totp/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<TotpStatus>>, ApiError> {
    let status = state.auth_service().totp_status(current.id).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// POST /api/totp/setup
///
/// Issues a pending secret and enrollment URI. Nothing is enforced until
/// the enable step proves the authenticator works.
pub async fn setup(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<TotpEnrollment>>, ApiError> {
    let enrollment = state.auth_service().totp_setup(current.id).await?;
    Ok(Json(ApiResponse::success(enrollment)))
}

/// POST /api/totp/enable
pub async fn enable(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<CodeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .totp_enable(current.id, &payload.code)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Two-factor authentication enabled".to_string(),
    })))
}

/// POST /api/totp/verify
///
/// Step-up verification before sensitive operations.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<CodeRequest>,
) -> Result<Json<ApiResponse<VerifyResponse>>, ApiError> {
    let is_valid = state
        .auth_service()
        .totp_verify(current.id, &payload.code)
        .await?;
    Ok(Json(ApiResponse::success(VerifyResponse { is_valid })))
}

/// POST /api/totp/rotate
///
/// Returns a candidate secret. The stored secret stays valid until the
/// confirm step proves possession of both devices.
pub async fn rotate_begin(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<TotpEnrollment>>, ApiError> {
    let enrollment = state.auth_service().totp_rotate_begin(current.id).await?;
    Ok(Json(ApiResponse::success(enrollment)))
}

/// POST /api/totp/rotate/confirm
pub async fn rotate_confirm(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<RotateConfirmRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .totp_rotate_confirm(
            current.id,
            &payload.old_code,
            &payload.new_code,
            &payload.new_secret,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Authenticator secret rotated".to_string(),
    })))
}

/// POST /api/totp/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<DisableRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .totp_disable(current.id, &payload.password, &payload.code)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Two-factor authentication disabled".to_string(),
    })))
}
