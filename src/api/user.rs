//! User console endpoints: dashboard, activity logs, login history,
//! membership status.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::normalize_paging;
use super::{
    ApiError, ApiResponse, AppState, AuditLogDto, LoginHistoryDto, PageQuery, PagedResponse,
};
use crate::constants::limits::DEFAULT_LOG_LIMIT;
use crate::services::MembershipStatus;

#[derive(Serialize)]
pub struct DashboardResponse {
    pub username: String,
    pub membership: MembershipStatus,
    pub total_keys: u64,
    pub active_keys: u64,
    pub inactive_keys: u64,
    pub expired_keys: u64,
    pub recent_activity: Vec<AuditLogDto>,
}

/// GET /api/user/dashboard
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<DashboardResponse>>, ApiError> {
    let user = state
        .store()
        .get_user_by_id(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(ApiError::unauthorized)?;

    let membership = state
        .membership()
        .status_for(&user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check membership: {e}")))?;

    let store = state.store();
    let total_keys = store.count_credentials_for_user(current.id).await?;
    let active_keys = store
        .count_credentials_by_status(current.id, "active")
        .await?;
    let inactive_keys = store
        .count_credentials_by_status(current.id, "inactive")
        .await?;
    let expired_keys = store
        .count_credentials_by_status(current.id, "expired")
        .await?;

    let recent_activity = store
        .recent_audit_logs(current.id, 10)
        .await?
        .into_iter()
        .map(AuditLogDto::from)
        .collect();

    Ok(Json(ApiResponse::success(DashboardResponse {
        username: user.username,
        membership,
        total_keys,
        active_keys,
        inactive_keys,
        expired_keys,
        recent_activity,
    })))
}

/// GET /api/user/logs
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PagedResponse<AuditLogDto>>>, ApiError> {
    let (page, limit) = normalize_paging(query.page, query.limit);

    let (rows, total_pages) = state
        .store()
        .audit_logs_for_user(current.id, page, limit, query.action.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(PagedResponse {
        items: rows.into_iter().map(AuditLogDto::from).collect(),
        total_pages,
    })))
}

/// GET /api/user/log-actions
///
/// Distinct action names, for filter dropdowns.
pub async fn get_log_actions(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let actions = state.store().audit_actions_for_user(current.id).await?;
    Ok(Json(ApiResponse::success(actions)))
}

/// GET /api/user/login-history
pub async fn get_login_history(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<LoginHistoryDto>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, 200);

    let rows = state
        .store()
        .login_history_for_user(current.id, limit)
        .await?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(LoginHistoryDto::from).collect(),
    )))
}

/// GET /api/membership/status
pub async fn get_membership_status(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<MembershipStatus>>, ApiError> {
    let user = state
        .store()
        .get_user_by_id(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(ApiError::unauthorized)?;

    let status = state
        .membership()
        .status_for(&user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check membership: {e}")))?;

    Ok(Json(ApiResponse::success(status)))
}
