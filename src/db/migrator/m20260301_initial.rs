use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Bootstrap admin credentials. The password must be rotated on first
/// login; the seeded value only exists so a fresh install is reachable.
const BOOTSTRAP_ADMIN_USERNAME: &str = "admin";
const BOOTSTRAP_ADMIN_EMAIL: &str = "admin@localhost";
const BOOTSTRAP_ADMIN_PASSWORD: &str = "password";

/// Hash the bootstrap password using Argon2id
fn hash_bootstrap_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(BOOTSTRAP_ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("Failed to hash bootstrap password")
        .to_string()
}

/// Builtin provider catalog: (name, display_name, base_url, icon).
const BUILTIN_PROVIDERS: &[(&str, &str, &str, &str)] = &[
    ("openai", "OpenAI", "https://api.openai.com/v1", "openai"),
    (
        "anthropic",
        "Anthropic",
        "https://api.anthropic.com/v1",
        "anthropic",
    ),
    (
        "google",
        "Google AI",
        "https://generativelanguage.googleapis.com/v1beta",
        "google",
    ),
    ("deepseek", "DeepSeek", "https://api.deepseek.com/v1", "deepseek"),
];

/// Seed models: (provider_name, model_id, model_name, category, context_window).
const BUILTIN_MODELS: &[(&str, &str, &str, &str, &str)] = &[
    ("openai", "gpt-4o", "GPT-4o", "chat", "128K"),
    ("openai", "gpt-4o-mini", "GPT-4o mini", "economy", "128K"),
    (
        "anthropic",
        "claude-sonnet-4-20250514",
        "Claude Sonnet 4",
        "chat",
        "200K",
    ),
    (
        "google",
        "gemini-2.0-flash",
        "Gemini 2.0 Flash",
        "chat",
        "1M",
    ),
    ("deepseek", "deepseek-chat", "DeepSeek Chat", "chat", "64K"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        for mut stmt in [
            schema.create_table_from_entity(Users),
            schema.create_table_from_entity(ApiProviders),
            schema.create_table_from_entity(ApiModels),
            schema.create_table_from_entity(StoredCredentials),
            schema.create_table_from_entity(TotpConfigs),
            schema.create_table_from_entity(AuditLogs),
            schema.create_table_from_entity(LoginHistory),
        ] {
            manager
                .create_table(stmt.if_not_exists().to_owned())
                .await?;
        }

        // Key names are unique per owner, not globally.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_credentials_user_key_name")
                    .table(StoredCredentials)
                    .col(crate::entities::stored_credentials::Column::UserId)
                    .col(crate::entities::stored_credentials::Column::KeyName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_audit_logs_user_created")
                    .table(AuditLogs)
                    .col(crate::entities::audit_logs::Column::UserId)
                    .col(crate::entities::audit_logs::Column::CreatedAt)
                    .to_owned(),
            )
            .await?;

        let now = chrono::Utc::now().to_rfc3339();

        let insert_admin = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                crate::entities::users::Column::Username,
                crate::entities::users::Column::Email,
                crate::entities::users::Column::PasswordHash,
                crate::entities::users::Column::Role,
                crate::entities::users::Column::MembershipTier,
                crate::entities::users::Column::IsActive,
                crate::entities::users::Column::LoginAttempts,
                crate::entities::users::Column::CreatedAt,
                crate::entities::users::Column::UpdatedAt,
            ])
            .values_panic([
                BOOTSTRAP_ADMIN_USERNAME.into(),
                BOOTSTRAP_ADMIN_EMAIL.into(),
                hash_bootstrap_password().into(),
                "admin".into(),
                "free".into(),
                true.into(),
                0.into(),
                now.clone().into(),
                now.clone().into(),
            ])
            .to_owned();

        manager.exec_stmt(insert_admin).await?;

        for (i, (name, display_name, base_url, icon)) in BUILTIN_PROVIDERS.iter().enumerate() {
            let insert = sea_orm_migration::sea_query::Query::insert()
                .into_table(ApiProviders)
                .columns([
                    crate::entities::api_providers::Column::Name,
                    crate::entities::api_providers::Column::DisplayName,
                    crate::entities::api_providers::Column::BaseUrl,
                    crate::entities::api_providers::Column::Icon,
                    crate::entities::api_providers::Column::IsActive,
                    crate::entities::api_providers::Column::IsCustom,
                    crate::entities::api_providers::Column::SortOrder,
                    crate::entities::api_providers::Column::CreatedAt,
                    crate::entities::api_providers::Column::UpdatedAt,
                ])
                .values_panic([
                    (*name).into(),
                    (*display_name).into(),
                    (*base_url).into(),
                    (*icon).into(),
                    true.into(),
                    false.into(),
                    <i32 as TryFrom<usize>>::try_from(i).unwrap_or(0).into(),
                    now.clone().into(),
                    now.clone().into(),
                ])
                .to_owned();
            manager.exec_stmt(insert).await?;
        }

        for (i, (provider_name, model_id, model_name, category, context)) in
            BUILTIN_MODELS.iter().enumerate()
        {
            // Provider ids follow seed order, starting at 1.
            let provider_id = BUILTIN_PROVIDERS
                .iter()
                .position(|(name, ..)| name == provider_name)
                .map_or(1, |p| <i64 as TryFrom<usize>>::try_from(p).unwrap_or(0) + 1);

            let insert = sea_orm_migration::sea_query::Query::insert()
                .into_table(ApiModels)
                .columns([
                    crate::entities::api_models::Column::ProviderId,
                    crate::entities::api_models::Column::ModelId,
                    crate::entities::api_models::Column::ModelName,
                    crate::entities::api_models::Column::Category,
                    crate::entities::api_models::Column::ContextWindow,
                    crate::entities::api_models::Column::IsDefault,
                    crate::entities::api_models::Column::SortOrder,
                    crate::entities::api_models::Column::CreatedAt,
                ])
                .values_panic([
                    provider_id.into(),
                    (*model_id).into(),
                    (*model_name).into(),
                    (*category).into(),
                    (*context).into(),
                    false.into(),
                    <i32 as TryFrom<usize>>::try_from(i).unwrap_or(0).into(),
                    now.clone().into(),
                ])
                .to_owned();
            manager.exec_stmt(insert).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LoginHistory).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuditLogs).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TotpConfigs).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StoredCredentials).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApiModels).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApiProviders).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
