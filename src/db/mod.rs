use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::audit::AuditEntry;
pub use repositories::credential::{CredentialUpdate, NewCredential};
pub use repositories::user::{FailedAttemptOutcome, User};

use crate::config::SecurityConfig;
use crate::entities::{api_models, api_providers, audit_logs, login_history, stored_credentials,
    totp_configs};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn credential_repo(&self) -> repositories::credential::CredentialRepository {
        repositories::credential::CredentialRepository::new(self.conn.clone())
    }

    fn provider_repo(&self) -> repositories::provider::ProviderRepository {
        repositories::provider::ProviderRepository::new(self.conn.clone())
    }

    fn totp_repo(&self) -> repositories::totp::TotpRepository {
        repositories::totp::TotpRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    // Users

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        config: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(username, email, password, config)
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, config)
            .await
    }

    pub async fn record_failed_attempt(&self, user_id: i32) -> Result<FailedAttemptOutcome> {
        self.user_repo().record_failed_attempt(user_id).await
    }

    pub async fn record_successful_login(&self, user_id: i32) -> Result<()> {
        self.user_repo().record_successful_login(user_id).await
    }

    pub async fn set_user_role(&self, user_id: i32, role: &str) -> Result<()> {
        self.user_repo().set_role(user_id, role).await
    }

    pub async fn set_user_active(&self, user_id: i32, is_active: bool) -> Result<()> {
        self.user_repo().set_active(user_id, is_active).await
    }

    pub async fn update_user_membership(
        &self,
        user_id: i32,
        tier: &str,
        expire_at: Option<String>,
        started_at: Option<String>,
    ) -> Result<()> {
        self.user_repo()
            .update_membership(user_id, tier, expire_at, started_at)
            .await
    }

    pub async fn downgrade_user_to_free(&self, user_id: i32) -> Result<()> {
        self.user_repo().downgrade_to_free(user_id).await
    }

    pub async fn find_expired_memberships(&self) -> Result<Vec<User>> {
        self.user_repo().find_expired_memberships().await
    }

    pub async fn delete_user(&self, user_id: i32) -> Result<bool> {
        self.user_repo().delete(user_id).await
    }

    pub async fn list_users(
        &self,
        page: u64,
        per_page: u64,
        search: Option<&str>,
    ) -> Result<(Vec<User>, u64)> {
        self.user_repo().list(page, per_page, search).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn count_active_users(&self) -> Result<u64> {
        self.user_repo().count_active().await
    }

    pub async fn count_users_created_since(&self, since: &str) -> Result<u64> {
        self.user_repo().count_created_since(since).await
    }

    // Stored credentials

    pub async fn create_credential(&self, new: NewCredential) -> Result<stored_credentials::Model> {
        self.credential_repo().create(new).await
    }

    pub async fn list_credentials(
        &self,
        user_id: i32,
        status_filter: Option<&str>,
    ) -> Result<Vec<stored_credentials::Model>> {
        self.credential_repo()
            .list_for_user(user_id, status_filter)
            .await
    }

    pub async fn get_credential(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<Option<stored_credentials::Model>> {
        self.credential_repo().get_for_user(id, user_id).await
    }

    pub async fn credential_name_taken(
        &self,
        user_id: i32,
        key_name: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool> {
        self.credential_repo()
            .name_taken(user_id, key_name, exclude_id)
            .await
    }

    pub async fn update_credential(
        &self,
        id: i32,
        user_id: i32,
        update: CredentialUpdate,
    ) -> Result<Option<stored_credentials::Model>> {
        self.credential_repo().update(id, user_id, update).await
    }

    pub async fn touch_credential(&self, id: i32) -> Result<()> {
        self.credential_repo().touch_last_used(id).await
    }

    pub async fn delete_credential(&self, id: i32, user_id: i32) -> Result<bool> {
        self.credential_repo().delete_for_user(id, user_id).await
    }

    pub async fn count_credentials_for_user(&self, user_id: i32) -> Result<u64> {
        self.credential_repo().count_for_user(user_id).await
    }

    pub async fn count_credentials_by_status(&self, user_id: i32, status: &str) -> Result<u64> {
        self.credential_repo()
            .count_for_user_by_status(user_id, status)
            .await
    }

    pub async fn count_credentials_for_provider(&self, provider_id: i32) -> Result<u64> {
        self.credential_repo().count_for_provider(provider_id).await
    }

    pub async fn count_all_credentials(&self) -> Result<u64> {
        self.credential_repo().count_all().await
    }

    // Providers and models

    pub async fn providers_for_user(&self, user_id: i32) -> Result<Vec<api_providers::Model>> {
        self.provider_repo().visible_for_user(user_id).await
    }

    pub async fn list_all_providers(&self) -> Result<Vec<api_providers::Model>> {
        self.provider_repo().list_all().await
    }

    pub async fn get_provider(&self, id: i32) -> Result<Option<api_providers::Model>> {
        self.provider_repo().get_by_id(id).await
    }

    pub async fn provider_display_name_taken(&self, display_name: &str) -> Result<bool> {
        self.provider_repo().display_name_taken(display_name).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_provider(
        &self,
        name: &str,
        display_name: &str,
        base_url: &str,
        description: Option<String>,
        icon: Option<String>,
        is_custom: bool,
        created_by: Option<i32>,
    ) -> Result<api_providers::Model> {
        self.provider_repo()
            .create(
                name,
                display_name,
                base_url,
                description,
                icon,
                is_custom,
                created_by,
            )
            .await
    }

    pub async fn update_provider(
        &self,
        id: i32,
        display_name: Option<String>,
        base_url: Option<String>,
        description: Option<String>,
        icon: Option<String>,
    ) -> Result<Option<api_providers::Model>> {
        self.provider_repo()
            .update(id, display_name, base_url, description, icon)
            .await
    }

    pub async fn set_provider_active(&self, id: i32, is_active: bool) -> Result<bool> {
        self.provider_repo().set_active(id, is_active).await
    }

    pub async fn delete_provider(&self, id: i32) -> Result<bool> {
        self.provider_repo().delete(id).await
    }

    pub async fn count_providers(&self) -> Result<u64> {
        self.provider_repo().count().await
    }

    pub async fn models_for_user(&self, user_id: i32) -> Result<Vec<api_models::Model>> {
        self.provider_repo().models_visible_for_user(user_id).await
    }

    pub async fn models_for_provider(&self, provider_id: i32) -> Result<Vec<api_models::Model>> {
        self.provider_repo().models_for_provider(provider_id).await
    }

    pub async fn list_all_models(&self) -> Result<Vec<api_models::Model>> {
        self.provider_repo().list_models().await
    }

    pub async fn get_model(&self, id: i32) -> Result<Option<api_models::Model>> {
        self.provider_repo().get_model(id).await
    }

    pub async fn create_model(
        &self,
        provider_id: i32,
        model_id: &str,
        model_name: Option<String>,
        category: &str,
        context_window: Option<String>,
    ) -> Result<api_models::Model> {
        self.provider_repo()
            .create_model(provider_id, model_id, model_name, category, context_window)
            .await
    }

    pub async fn update_model(
        &self,
        id: i32,
        model_name: Option<String>,
        category: Option<String>,
        context_window: Option<String>,
    ) -> Result<Option<api_models::Model>> {
        self.provider_repo()
            .update_model(id, model_name, category, context_window)
            .await
    }

    pub async fn delete_model(&self, id: i32) -> Result<bool> {
        self.provider_repo().delete_model(id).await
    }

    // TOTP

    pub async fn get_totp_config(&self, user_id: i32) -> Result<Option<totp_configs::Model>> {
        self.totp_repo().get_for_user(user_id).await
    }

    pub async fn upsert_pending_totp_secret(&self, user_id: i32, secret: &str) -> Result<()> {
        self.totp_repo().upsert_pending_secret(user_id, secret).await
    }

    pub async fn set_totp_enabled(&self, user_id: i32, enabled: bool) -> Result<()> {
        self.totp_repo().set_enabled(user_id, enabled).await
    }

    pub async fn replace_totp_secret(&self, user_id: i32, new_secret: &str) -> Result<()> {
        self.totp_repo().replace_secret(user_id, new_secret).await
    }

    pub async fn delete_totp_config(&self, user_id: i32) -> Result<bool> {
        self.totp_repo().delete_for_user(user_id).await
    }

    // Audit

    pub async fn log_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit_repo().log(entry).await
    }

    pub async fn audit_logs_for_user(
        &self,
        user_id: i32,
        page: u64,
        per_page: u64,
        action_filter: Option<&str>,
    ) -> Result<(Vec<audit_logs::Model>, u64)> {
        self.audit_repo()
            .list_for_user(user_id, page, per_page, action_filter)
            .await
    }

    pub async fn recent_audit_logs(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<audit_logs::Model>> {
        self.audit_repo().recent_for_user(user_id, limit).await
    }

    pub async fn audit_actions_for_user(&self, user_id: i32) -> Result<Vec<String>> {
        self.audit_repo().actions_for_user(user_id).await
    }

    pub async fn record_login_history(
        &self,
        user_id: i32,
        ip_address: Option<String>,
        user_agent: Option<String>,
        login_type: &str,
        status: &str,
        fail_reason: Option<&str>,
    ) -> Result<()> {
        self.audit_repo()
            .record_login(user_id, ip_address, user_agent, login_type, status, fail_reason)
            .await
    }

    pub async fn login_history_for_user(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<login_history::Model>> {
        self.audit_repo().login_history_for_user(user_id, limit).await
    }
}
