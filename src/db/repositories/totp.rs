use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::entities::totp_configs;

pub struct TotpRepository {
    conn: DatabaseConnection,
}

impl TotpRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_for_user(&self, user_id: i32) -> Result<Option<totp_configs::Model>> {
        Ok(totp_configs::Entity::find()
            .filter(totp_configs::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query TOTP config")?)
    }

    /// Store a (not yet enabled) candidate secret, replacing any prior
    /// disabled configuration. Enabled configurations are left untouched.
    pub async fn upsert_pending_secret(&self, user_id: i32, secret: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        match self.get_for_user(user_id).await? {
            Some(existing) if existing.is_enabled => {
                anyhow::bail!("TOTP already enabled for user {user_id}")
            }
            Some(existing) => {
                let mut active: totp_configs::ActiveModel = existing.into();
                active.secret = Set(secret.to_string());
                active.updated_at = Set(now);
                active.update(&self.conn).await?;
            }
            None => {
                totp_configs::ActiveModel {
                    user_id: Set(user_id),
                    secret: Set(secret.to_string()),
                    is_enabled: Set(false),
                    created_at: Set(now.clone()),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&self.conn)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn set_enabled(&self, user_id: i32, enabled: bool) -> Result<()> {
        let config = self
            .get_for_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No TOTP config for user {user_id}"))?;

        let mut active: totp_configs::ActiveModel = config.into();
        active.is_enabled = Set(enabled);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;
        Ok(())
    }

    /// In-place secret replacement; callers must have completed the
    /// dual-code confirmation first.
    pub async fn replace_secret(&self, user_id: i32, new_secret: &str) -> Result<()> {
        let config = self
            .get_for_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No TOTP config for user {user_id}"))?;

        let mut active: totp_configs::ActiveModel = config.into();
        active.secret = Set(new_secret.to_string());
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn delete_for_user(&self, user_id: i32) -> Result<bool> {
        let result = totp_configs::Entity::delete_many()
            .filter(totp_configs::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete TOTP config")?;
        Ok(result.rows_affected > 0)
    }
}
