//! Provider and model catalog endpoints for regular users.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, MessageResponse, ModelDto, ProviderDto};
use chrono::Utc;

#[derive(Deserialize)]
pub struct CreateProviderRequest {
    pub display_name: String,
    pub base_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// GET /api/keys/providers
///
/// Global providers plus the caller's own custom entries.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<ProviderDto>>>, ApiError> {
    let rows = state
        .store()
        .providers_for_user(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list providers: {e}")))?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ProviderDto::from).collect(),
    )))
}

/// POST /api/keys/providers
pub async fn create_custom_provider(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<CreateProviderRequest>,
) -> Result<Json<ApiResponse<ProviderDto>>, ApiError> {
    if payload.display_name.trim().is_empty() {
        return Err(ApiError::validation("Provider name cannot be empty"));
    }
    if !payload.base_url.starts_with("http://") && !payload.base_url.starts_with("https://") {
        return Err(ApiError::validation("Base URL must be an http(s) URL"));
    }

    if state
        .store()
        .provider_display_name_taken(payload.display_name.trim())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check provider name: {e}")))?
    {
        return Err(ApiError::Conflict(
            "Provider name already exists".to_string(),
        ));
    }

    // Slug must be unique; user id plus epoch seconds is enough.
    let slug = format!("custom_{}_{}", current.id, Utc::now().timestamp());

    let model = state
        .store()
        .create_provider(
            &slug,
            payload.display_name.trim(),
            &payload.base_url,
            payload.description,
            payload.icon.or_else(|| Some("link".to_string())),
            true,
            Some(current.id),
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create provider: {e}")))?;

    Ok(Json(ApiResponse::success(ProviderDto::from(model))))
}

/// DELETE /api/keys/providers/{id}
///
/// Own custom providers only, and only while no credential references them.
pub async fn delete_custom_provider(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;

    let provider = state
        .store()
        .get_provider(id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load provider: {e}")))?
        .ok_or_else(|| ApiError::not_found("Provider", id))?;

    if !provider.is_custom {
        return Err(ApiError::forbidden("Global providers cannot be deleted"));
    }
    if provider.created_by != Some(current.id) {
        return Err(ApiError::forbidden(
            "Only the creator may delete this provider",
        ));
    }

    let key_count = state
        .store()
        .count_credentials_for_provider(id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count credentials: {e}")))?;
    if key_count > 0 {
        return Err(ApiError::validation(format!(
            "{key_count} stored credentials reference this provider; delete them first"
        )));
    }

    state
        .store()
        .delete_provider(id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete provider: {e}")))?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Provider deleted".to_string(),
    })))
}

/// GET /api/keys/models
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<ModelDto>>>, ApiError> {
    let rows = state
        .store()
        .models_for_user(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list models: {e}")))?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ModelDto::from).collect(),
    )))
}

/// GET /api/keys/models/{provider_id}
pub async fn list_provider_models(
    State(state): State<Arc<AppState>>,
    axum::Extension(_current): axum::Extension<CurrentUser>,
    Path(provider_id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<ModelDto>>>, ApiError> {
    validate_id(provider_id)?;

    let rows = state
        .store()
        .models_for_provider(provider_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list models: {e}")))?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(ModelDto::from).collect(),
    )))
}
