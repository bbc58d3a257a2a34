//! Stored credential endpoints: CRUD, reveal, quota, connectivity test.
//!
//! Plaintext keys exist in memory only inside these handlers: they arrive
//! in a request body, are encrypted before touching the store, and are only
//! ever returned by the explicit reveal endpoint.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::{validate_id, validate_key_name, validate_status};
use super::{ApiError, ApiResponse, AppState, CredentialDto, MessageResponse, RevealedCredentialDto};
use crate::db::{CredentialUpdate, NewCredential};
use crate::security::cipher::key_preview;

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub provider_id: i32,
    pub key_name: String,
    pub api_key: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateKeyRequest {
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct KeyLimitsResponse {
    pub current_count: u64,
    /// -1 means unlimited.
    pub limit: i64,
    pub can_add: bool,
}

#[derive(Deserialize)]
pub struct TestKeyRequest {
    pub provider_id: i32,
    pub api_key: String,
}

#[derive(Serialize)]
pub struct TestKeyResponse {
    pub success: bool,
    pub message: String,
    pub provider_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_count: Option<usize>,
}

async fn provider_name(state: &AppState, provider_id: Option<i32>) -> Option<String> {
    let id = provider_id?;
    state
        .store()
        .get_provider(id)
        .await
        .ok()
        .flatten()
        .map(|p| p.display_name)
}

async fn check_quota(
    state: &AppState,
    current: &CurrentUser,
) -> Result<(bool, u64, i64), ApiError> {
    let user = state
        .store()
        .get_user_by_id(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(ApiError::unauthorized)?;

    let limit = {
        let config = state.config().read().await;
        config.membership.key_limit_for(&user.membership_tier)
    };

    let count = state
        .store()
        .count_credentials_for_user(current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count credentials: {e}")))?;

    let can_add = limit < 0 || count < u64::try_from(limit).unwrap_or(0);
    Ok((can_add, count, limit))
}

/// GET /api/keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<CredentialDto>>>, ApiError> {
    if let Some(status) = query.status.as_deref() {
        validate_status(status)?;
    }

    let rows = state
        .store()
        .list_credentials(current.id, query.status.as_deref())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list credentials: {e}")))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let name = provider_name(&state, row.provider_id).await;
        out.push(CredentialDto::from_model(row, name));
    }

    Ok(Json(ApiResponse::success(out)))
}

/// POST /api/keys
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(payload): Json<CreateKeyRequest>,
) -> Result<Json<ApiResponse<CredentialDto>>, ApiError> {
    let key_name = validate_key_name(&payload.key_name)?.to_string();
    if payload.api_key.is_empty() {
        return Err(ApiError::validation("API key cannot be empty"));
    }

    let (can_add, count, limit) = check_quota(&state, &current).await?;
    if !can_add {
        return Err(ApiError::forbidden(format!(
            "Credential limit reached ({count}/{limit}); upgrade membership to store more keys"
        )));
    }

    let provider = state
        .store()
        .get_provider(payload.provider_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load provider: {e}")))?
        .ok_or_else(|| ApiError::validation("Provider not found"))?;

    if state
        .store()
        .credential_name_taken(current.id, &key_name, None)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check name: {e}")))?
    {
        return Err(ApiError::Conflict("Key name already exists".to_string()));
    }

    let ciphertext = state.cipher().encrypt(&payload.api_key)?;
    let preview = key_preview(&payload.api_key);

    let model = state
        .store()
        .create_credential(NewCredential {
            user_id: current.id,
            provider_id: Some(provider.id),
            key_name: key_name.clone(),
            key_ciphertext: ciphertext,
            key_preview: preview,
            model_id: payload.model_id,
            expires_at: payload.expires_at,
            notes: payload.notes,
        })
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store credential: {e}")))?;

    state
        .store()
        .log_audit(
            crate::db::AuditEntry::success("create_key")
                .by(current.id, &current.username)
                .on("API_KEY", Some(model.id), &key_name),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(CredentialDto::from_model(
        model,
        Some(provider.display_name),
    ))))
}

/// GET /api/keys/limits
pub async fn get_key_limits(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Result<Json<ApiResponse<KeyLimitsResponse>>, ApiError> {
    let (can_add, current_count, limit) = check_quota(&state, &current).await?;
    Ok(Json(ApiResponse::success(KeyLimitsResponse {
        current_count,
        limit,
        can_add,
    })))
}

/// GET /api/keys/{id}
pub async fn get_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<CredentialDto>>, ApiError> {
    validate_id(id)?;

    let row = state
        .store()
        .get_credential(id, current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load credential: {e}")))?
        .ok_or_else(|| ApiError::not_found("Credential", id))?;

    let name = provider_name(&state, row.provider_id).await;
    Ok(Json(ApiResponse::success(CredentialDto::from_model(
        row, name,
    ))))
}

/// GET /api/keys/{id}/reveal
///
/// The only endpoint that decrypts. Touches `last_used_at`.
pub async fn reveal_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<RevealedCredentialDto>>, ApiError> {
    validate_id(id)?;

    let row = state
        .store()
        .get_credential(id, current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load credential: {e}")))?
        .ok_or_else(|| ApiError::not_found("Credential", id))?;

    let plaintext = state.cipher().decrypt(&row.key_ciphertext)?;

    state.store().touch_credential(row.id).await.ok();
    state
        .store()
        .log_audit(
            crate::db::AuditEntry::success("reveal_key")
                .by(current.id, &current.username)
                .on("API_KEY", Some(row.id), &row.key_name),
        )
        .await
        .ok();

    let name = provider_name(&state, row.provider_id).await;
    Ok(Json(ApiResponse::success(RevealedCredentialDto {
        credential: CredentialDto::from_model(row, name),
        api_key: plaintext,
    })))
}

/// PUT /api/keys/{id}
pub async fn update_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateKeyRequest>,
) -> Result<Json<ApiResponse<CredentialDto>>, ApiError> {
    validate_id(id)?;

    let mut update = CredentialUpdate::default();

    if let Some(name) = payload.key_name {
        let name = validate_key_name(&name)?.to_string();
        if state
            .store()
            .credential_name_taken(current.id, &name, Some(id))
            .await
            .map_err(|e| ApiError::internal(format!("Failed to check name: {e}")))?
        {
            return Err(ApiError::Conflict("Key name already exists".to_string()));
        }
        update.key_name = Some(name);
    }

    // Ciphertext is only rewritten when a replacement plaintext arrives.
    if let Some(api_key) = payload.api_key {
        if api_key.is_empty() {
            return Err(ApiError::validation("API key cannot be empty"));
        }
        update.key_ciphertext = Some(state.cipher().encrypt(&api_key)?);
        update.key_preview = Some(key_preview(&api_key));
    }

    if let Some(status) = payload.status {
        validate_status(&status)?;
        update.status = Some(status);
    }
    if payload.model_id.is_some() {
        update.model_id = Some(payload.model_id);
    }
    if payload.expires_at.is_some() {
        update.expires_at = Some(payload.expires_at);
    }
    if payload.notes.is_some() {
        update.notes = Some(payload.notes);
    }

    let row = state
        .store()
        .update_credential(id, current.id, update)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update credential: {e}")))?
        .ok_or_else(|| ApiError::not_found("Credential", id))?;

    state
        .store()
        .log_audit(
            crate::db::AuditEntry::success("update_key")
                .by(current.id, &current.username)
                .on("API_KEY", Some(row.id), &row.key_name),
        )
        .await
        .ok();

    let name = provider_name(&state, row.provider_id).await;
    Ok(Json(ApiResponse::success(CredentialDto::from_model(
        row, name,
    ))))
}

/// DELETE /api/keys/{id}
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_id(id)?;

    let removed = state
        .store()
        .delete_credential(id, current.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to delete credential: {e}")))?;

    if !removed {
        return Err(ApiError::not_found("Credential", id));
    }

    state
        .store()
        .log_audit(
            crate::db::AuditEntry::success("delete_key")
                .by(current.id, &current.username)
                .on("API_KEY", Some(id), ""),
        )
        .await
        .ok();

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Credential deleted".to_string(),
    })))
}

/// POST /api/keys/test
///
/// Probes the provider's model-listing endpoint without spending quota.
/// Custom providers are skipped: their endpoints are unknown shapes.
pub async fn test_key(
    State(state): State<Arc<AppState>>,
    axum::Extension(_current): axum::Extension<CurrentUser>,
    Json(payload): Json<TestKeyRequest>,
) -> Result<Json<ApiResponse<TestKeyResponse>>, ApiError> {
    if payload.api_key.is_empty() {
        return Err(ApiError::validation("API key is required"));
    }

    let provider = state
        .store()
        .get_provider(payload.provider_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load provider: {e}")))?
        .ok_or_else(|| ApiError::not_found("Provider", payload.provider_id))?;

    if provider.is_custom {
        return Ok(Json(ApiResponse::success(TestKeyResponse {
            success: false,
            message: "Connectivity tests are not available for custom providers".to_string(),
            provider_name: provider.display_name,
            model_count: None,
        })));
    }

    let base_url = provider.base_url.trim_end_matches('/');

    // Anthropic has no inexpensive listing endpoint worth probing.
    if provider.name == "anthropic" {
        return Ok(Json(ApiResponse::success(TestKeyResponse {
            success: true,
            message: "Key format accepted; Anthropic offers no free validation endpoint"
                .to_string(),
            provider_name: provider.display_name,
            model_count: None,
        })));
    }

    // Google passes the key as a query parameter, everyone else as Bearer.
    let request = if provider.name == "google" {
        state
            .http_client()
            .get(format!("{base_url}/models?key={}", payload.api_key))
    } else {
        state
            .http_client()
            .get(format!("{base_url}/models"))
            .bearer_auth(&payload.api_key)
    };

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return Ok(Json(ApiResponse::success(TestKeyResponse {
                success: false,
                message: "Connection timed out".to_string(),
                provider_name: provider.display_name,
                model_count: None,
            })));
        }
        Err(_) => {
            return Ok(Json(ApiResponse::success(TestKeyResponse {
                success: false,
                message: "Could not reach the provider".to_string(),
                provider_name: provider.display_name,
                model_count: None,
            })));
        }
    };

    let result = match response.status().as_u16() {
        200 => {
            let model_count = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("data").and_then(|d| d.as_array().map(Vec::len)));
            TestKeyResponse {
                success: true,
                message: model_count.map_or_else(
                    || "Connection succeeded, key is valid".to_string(),
                    |n| format!("Connection succeeded, {n} models available"),
                ),
                provider_name: provider.display_name,
                model_count,
            }
        }
        401 => TestKeyResponse {
            success: false,
            message: "Key is invalid or expired".to_string(),
            provider_name: provider.display_name,
            model_count: None,
        },
        403 => TestKeyResponse {
            success: false,
            message: "Key lacks permission".to_string(),
            provider_name: provider.display_name,
            model_count: None,
        },
        status => TestKeyResponse {
            success: false,
            message: format!("Connection failed with status {status}"),
            provider_name: provider.display_name,
            model_count: None,
        },
    };

    Ok(Json(ApiResponse::success(result)))
}
