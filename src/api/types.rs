use serde::{Deserialize, Serialize};

use crate::entities::{api_models, api_providers, audit_logs, login_history, stored_credentials};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Stored credential as shown in listings. The plaintext never appears;
/// only the preview derived at write time.
#[derive(Debug, Serialize)]
pub struct CredentialDto {
    pub id: i32,
    pub provider_id: Option<i32>,
    pub provider_name: Option<String>,
    pub key_name: String,
    pub key_preview: String,
    pub model_id: Option<String>,
    pub status: String,
    pub expires_at: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_used_at: Option<String>,
}

impl CredentialDto {
    #[must_use]
    pub fn from_model(model: stored_credentials::Model, provider_name: Option<String>) -> Self {
        Self {
            id: model.id,
            provider_id: model.provider_id,
            provider_name,
            key_name: model.key_name,
            key_preview: model.key_preview,
            model_id: model.model_id,
            status: model.status,
            expires_at: model.expires_at,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
            last_used_at: model.last_used_at,
        }
    }
}

/// Listing plus the decrypted plaintext, returned only by the explicit
/// reveal endpoint.
#[derive(Debug, Serialize)]
pub struct RevealedCredentialDto {
    #[serde(flatten)]
    pub credential: CredentialDto,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderDto {
    pub id: i32,
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    pub icon: Option<String>,
    pub is_active: bool,
    pub is_custom: bool,
    pub created_by: Option<i32>,
}

impl From<api_providers::Model> for ProviderDto {
    fn from(model: api_providers::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            display_name: model.display_name,
            base_url: model.base_url,
            icon: model.icon,
            is_active: model.is_active,
            is_custom: model.is_custom,
            created_by: model.created_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelDto {
    pub id: i32,
    pub provider_id: i32,
    pub model_id: String,
    pub model_name: Option<String>,
    pub category: String,
    pub context_window: Option<String>,
    pub is_default: bool,
}

impl From<api_models::Model> for ModelDto {
    fn from(model: api_models::Model) -> Self {
        Self {
            id: model.id,
            provider_id: model.provider_id,
            model_id: model.model_id,
            model_name: model.model_name,
            category: model.category,
            context_window: model.context_window,
            is_default: model.is_default,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditLogDto {
    pub id: i64,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_name: Option<String>,
    pub ip_address: Option<String>,
    pub status: String,
    pub details: Option<String>,
    pub created_at: String,
}

impl From<audit_logs::Model> for AuditLogDto {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            action: model.action,
            resource_type: model.resource_type,
            resource_name: model.resource_name,
            ip_address: model.ip_address,
            status: model.status,
            details: model.details,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginHistoryDto {
    pub id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub login_type: String,
    pub status: String,
    pub fail_reason: Option<String>,
    pub created_at: String,
}

impl From<login_history::Model> for LoginHistoryDto {
    fn from(model: login_history::Model) -> Self {
        Self {
            id: model.id,
            ip_address: model.ip_address,
            user_agent: model.user_agent,
            login_type: model.login_type,
            status: model.status,
            fail_reason: model.fail_reason,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}
