//! Admin console endpoints.
//!
//! These routes are mounted under the per-process dynamic prefix
//! (`/api/sec/{token}`) AND gated by [`require_admin_middleware`]; the
//! obfuscated path is never the only barrier. The legacy fixed `/api/admin`
//! paths answer 404 no matter who asks.

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::{normalize_paging, validate_id, validate_role, validate_tier};
use super::{
    ApiError, ApiResponse, AppState, MessageResponse, ModelDto, PageQuery, PagedResponse,
    ProviderDto,
};
use crate::db::AuditEntry;

// ============================================================================
// Middleware
// ============================================================================

/// Role gate for the whole admin router.
pub async fn require_admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(CurrentUser::is_admin);

    if !is_admin {
        return Err(ApiError::forbidden("Administrator role required"));
    }

    Ok(next.run(request).await)
}

/// Declared operation-sensitivity tag. Routes carrying one require the
/// caller to confirm via the `X-Confirm-Action: true` header before the
/// handler runs.
#[derive(Debug, Clone, Copy)]
pub struct HighRisk(pub &'static str);

pub async fn confirm_action_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(HighRisk(action)) = request.extensions().get::<HighRisk>().copied() {
        let confirmed = request
            .headers()
            .get("X-Confirm-Action")
            .and_then(|h| h.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if !confirmed {
            return Err(ApiError::forbidden(format!(
                "High-risk operation requires confirmation: {action}"
            )));
        }
    }

    Ok(next.run(request).await)
}

/// Fixed legacy admin paths are a 404 black hole regardless of auth.
pub async fn legacy_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

// ============================================================================
// Discovery
// ============================================================================

#[derive(Serialize)]
pub struct AdminPathResponse {
    pub admin_path: String,
    pub admin_url: String,
}

/// GET /api/admin-path
///
/// The authenticated discovery endpoint. Lives OUTSIDE the obfuscated
/// prefix (the caller is trying to learn it) but requires the admin role.
pub async fn get_admin_path(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<AdminPathResponse>>, ApiError> {
    super::auth::require_admin(&current)?;

    let base_url = {
        let config = state.config().read().await;
        config.server.public_base_url.clone()
    };

    let admin_path = state.shared.admin_path.as_ref();
    Ok(Json(ApiResponse::success(AdminPathResponse {
        admin_path: admin_path.token().to_string(),
        admin_url: admin_path.console_url(&base_url),
    })))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsOverview {
    pub total_users: u64,
    pub active_users: u64,
    pub new_users_7d: u64,
    pub total_credentials: u64,
    pub total_providers: u64,
}

/// GET {admin}/stats/overview
pub async fn stats_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StatsOverview>>, ApiError> {
    let store = state.store();
    let week_ago = (Utc::now() - Duration::days(7)).to_rfc3339();

    Ok(Json(ApiResponse::success(StatsOverview {
        total_users: store.count_users().await?,
        active_users: store.count_active_users().await?,
        new_users_7d: store.count_users_created_since(&week_ago).await?,
        total_credentials: store.count_all_credentials().await?,
        total_providers: store.count_providers().await?,
    })))
}

// ============================================================================
// User administration
// ============================================================================

#[derive(Serialize)]
pub struct AdminUserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub membership_tier: String,
    pub membership_expire_at: Option<String>,
    pub is_active: bool,
    pub login_attempts: i32,
    pub locked_until: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<crate::db::User> for AdminUserDto {
    fn from(user: crate::db::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            membership_tier: user.membership_tier,
            membership_expire_at: user.membership_expire_at,
            is_active: user.is_active,
            login_attempts: user.login_attempts,
            locked_until: user.locked_until,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct AdminUserDetail {
    #[serde(flatten)]
    pub user: AdminUserDto,
    pub credential_count: u64,
    pub totp_enabled: bool,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct UpdateMembershipRequest {
    pub tier: String,
    #[serde(default)]
    pub days: Option<i64>,
}

/// GET {admin}/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PagedResponse<AdminUserDto>>>, ApiError> {
    let (page, limit) = normalize_paging(query.page, query.limit);

    let (rows, total_pages) = state
        .store()
        .list_users(page, limit, query.search.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(PagedResponse {
        items: rows.into_iter().map(AdminUserDto::from).collect(),
        total_pages,
    })))
}

/// GET {admin}/users/{id}
pub async fn get_user_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AdminUserDetail>>, ApiError> {
    validate_id(id)?;

    let user = state
        .store()
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let credential_count = state.store().count_credentials_for_user(id).await?;
    let totp_enabled = state
        .store()
        .get_totp_config(id)
        .await?
        .is_some_and(|c| c.is_enabled);

    Ok(Json(ApiResponse::success(AdminUserDetail {
        user: AdminUserDto::from(user),
        credential_count,
        totp_enabled,
    })))
}

/// PUT {admin}/users/{id}/role  (high-risk, confirm header required)
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;
    validate_role(&payload.role)?;

    if id == current.id {
        return Err(ApiError::validation("Cannot change your own role"));
    }

    let user = state
        .store()
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    state.store().set_user_role(id, &payload.role).await?;
    state
        .store()
        .log_audit(
            AuditEntry::success("update_user_role")
                .by(current.id, &current.username)
                .on("USER", Some(id), &user.username)
                .with_details(&format!("role set to {}", payload.role)),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Role updated to {}", payload.role),
    })))
}

/// PUT {admin}/users/{id}/status  (high-risk, confirm header required)
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;

    if id == current.id {
        return Err(ApiError::validation("Cannot disable your own account"));
    }

    let user = state
        .store()
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    state.store().set_user_active(id, payload.is_active).await?;
    state
        .store()
        .log_audit(
            AuditEntry::success(if payload.is_active {
                "enable_user"
            } else {
                "disable_user"
            })
            .by(current.id, &current.username)
            .on("USER", Some(id), &user.username),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(MessageResponse {
        message: if payload.is_active {
            "User enabled".to_string()
        } else {
            "User disabled".to_string()
        },
    })))
}

/// PUT {admin}/users/{id}/membership  (high-risk, confirm header required)
pub async fn update_user_membership(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateMembershipRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;
    validate_tier(&payload.tier)?;

    let user = state
        .store()
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let now = Utc::now();
    let expire_at = if payload.tier == "free" {
        None
    } else {
        let days = payload.days.unwrap_or(30).max(1);
        Some((now + Duration::days(days)).to_rfc3339())
    };

    state
        .store()
        .update_user_membership(id, &payload.tier, expire_at, Some(now.to_rfc3339()))
        .await?;

    state
        .store()
        .log_audit(
            AuditEntry::success("update_membership")
                .by(current.id, &current.username)
                .on("USER", Some(id), &user.username)
                .with_details(&format!("tier set to {}", payload.tier)),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Membership set to {}", payload.tier),
    })))
}

// ============================================================================
// Provider administration
// ============================================================================

#[derive(Deserialize)]
pub struct AdminCreateProviderRequest {
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
pub struct AdminUpdateProviderRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
pub struct ProviderStatusRequest {
    pub is_active: bool,
}

/// GET {admin}/providers
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ProviderDto>>>, ApiError> {
    let rows = state.store().list_all_providers().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ProviderDto::from).collect(),
    )))
}

/// POST {admin}/providers
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<AdminCreateProviderRequest>,
) -> Result<Json<ApiResponse<ProviderDto>>, ApiError> {
    if payload.name.trim().is_empty() || payload.display_name.trim().is_empty() {
        return Err(ApiError::validation("Name and display name are required"));
    }

    if state
        .store()
        .provider_display_name_taken(payload.display_name.trim())
        .await?
    {
        return Err(ApiError::Conflict(
            "Provider name already exists".to_string(),
        ));
    }

    let model = state
        .store()
        .create_provider(
            payload.name.trim(),
            payload.display_name.trim(),
            &payload.base_url,
            payload.description,
            payload.icon,
            false,
            None,
        )
        .await?;

    state
        .store()
        .log_audit(
            AuditEntry::success("create_provider")
                .by(current.id, &current.username)
                .on("PROVIDER", Some(model.id), &model.display_name),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(ProviderDto::from(model))))
}

/// PUT {admin}/providers/{id}
pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<AdminUpdateProviderRequest>,
) -> Result<Json<ApiResponse<ProviderDto>>, ApiError> {
    validate_id(id)?;

    let model = state
        .store()
        .update_provider(
            id,
            payload.display_name,
            payload.base_url,
            payload.description,
            payload.icon,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Provider", id))?;

    Ok(Json(ApiResponse::success(ProviderDto::from(model))))
}

/// PUT {admin}/providers/{id}/status
pub async fn update_provider_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<ProviderStatusRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;

    if !state.store().set_provider_active(id, payload.is_active).await? {
        return Err(ApiError::not_found("Provider", id));
    }

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Provider status updated".to_string(),
    })))
}

// ============================================================================
// Model administration
// ============================================================================

#[derive(Deserialize)]
pub struct CreateModelRequest {
    pub provider_id: i32,
    pub model_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub context_window: Option<String>,
}

fn default_category() -> String {
    "chat".to_string()
}

#[derive(Deserialize)]
pub struct UpdateModelRequest {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub context_window: Option<String>,
}

/// GET {admin}/models
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ModelDto>>>, ApiError> {
    let rows = state.store().list_all_models().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ModelDto::from).collect(),
    )))
}

/// POST {admin}/models
pub async fn create_model(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateModelRequest>,
) -> Result<Json<ApiResponse<ModelDto>>, ApiError> {
    validate_id(payload.provider_id)?;
    if payload.model_id.trim().is_empty() {
        return Err(ApiError::validation("Model id is required"));
    }

    if state
        .store()
        .get_provider(payload.provider_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Provider", payload.provider_id));
    }

    let model = state
        .store()
        .create_model(
            payload.provider_id,
            payload.model_id.trim(),
            payload.model_name,
            &payload.category,
            payload.context_window,
        )
        .await?;

    Ok(Json(ApiResponse::success(ModelDto::from(model))))
}

/// PUT {admin}/models/{id}
pub async fn update_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateModelRequest>,
) -> Result<Json<ApiResponse<ModelDto>>, ApiError> {
    validate_id(id)?;

    let model = state
        .store()
        .update_model(
            id,
            payload.model_name,
            payload.category,
            payload.context_window,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Model", id))?;

    Ok(Json(ApiResponse::success(ModelDto::from(model))))
}

/// DELETE {admin}/models/{id}  (high-risk, confirm header required)
pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;

    let model = state
        .store()
        .get_model(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Model", id))?;

    state.store().delete_model(id).await?;
    state
        .store()
        .log_audit(
            AuditEntry::success("delete_model")
                .by(current.id, &current.username)
                .on("MODEL", Some(id), &model.model_id),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Model deleted".to_string(),
    })))
}
