use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::stored_credentials;

/// Fields for a new stored credential. The plaintext never reaches this
/// layer; callers encrypt and derive the preview first.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_id: i32,
    pub provider_id: Option<i32>,
    pub key_name: String,
    pub key_ciphertext: String,
    pub key_preview: String,
    pub model_id: Option<String>,
    pub expires_at: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub key_name: Option<String>,
    pub key_ciphertext: Option<String>,
    pub key_preview: Option<String>,
    pub model_id: Option<Option<String>>,
    pub status: Option<String>,
    pub expires_at: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

pub struct CredentialRepository {
    conn: DatabaseConnection,
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, new: NewCredential) -> Result<stored_credentials::Model> {
        let now = Utc::now().to_rfc3339();
        let model = stored_credentials::ActiveModel {
            user_id: Set(new.user_id),
            provider_id: Set(new.provider_id),
            key_name: Set(new.key_name),
            key_ciphertext: Set(new.key_ciphertext),
            key_preview: Set(new.key_preview),
            model_id: Set(new.model_id),
            status: Set("active".to_string()),
            expires_at: Set(new.expires_at),
            notes: Set(new.notes),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert credential")?;

        Ok(model)
    }

    pub async fn list_for_user(
        &self,
        user_id: i32,
        status_filter: Option<&str>,
    ) -> Result<Vec<stored_credentials::Model>> {
        let mut query = stored_credentials::Entity::find()
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .order_by_desc(stored_credentials::Column::CreatedAt);

        if let Some(status) = status_filter {
            query = query.filter(stored_credentials::Column::Status.eq(status));
        }

        let rows = query
            .all(&self.conn)
            .await
            .context("Failed to list credentials")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.expire_if_due(row).await?);
        }
        Ok(out)
    }

    pub async fn get_for_user(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<Option<stored_credentials::Model>> {
        let row = stored_credentials::Entity::find_by_id(id)
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query credential")?;

        match row {
            Some(row) => Ok(Some(self.expire_if_due(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn name_taken(
        &self,
        user_id: i32,
        key_name: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool> {
        let mut query = stored_credentials::Entity::find()
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .filter(stored_credentials::Column::KeyName.eq(key_name));

        if let Some(id) = exclude_id {
            query = query.filter(stored_credentials::Column::Id.ne(id));
        }

        Ok(query.count(&self.conn).await? > 0)
    }

    pub async fn update(
        &self,
        id: i32,
        user_id: i32,
        update: CredentialUpdate,
    ) -> Result<Option<stored_credentials::Model>> {
        let Some(row) = stored_credentials::Entity::find_by_id(id)
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query credential for update")?
        else {
            return Ok(None);
        };

        let mut active: stored_credentials::ActiveModel = row.into();
        if let Some(name) = update.key_name {
            active.key_name = Set(name);
        }
        if let Some(ciphertext) = update.key_ciphertext {
            active.key_ciphertext = Set(ciphertext);
        }
        if let Some(preview) = update.key_preview {
            active.key_preview = Set(preview);
        }
        if let Some(model_id) = update.model_id {
            active.model_id = Set(model_id);
        }
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(expires_at) = update.expires_at {
            active.expires_at = Set(expires_at);
        }
        if let Some(notes) = update.notes {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Utc::now().to_rfc3339());

        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn touch_last_used(&self, id: i32) -> Result<()> {
        if let Some(row) = stored_credentials::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
        {
            let mut active: stored_credentials::ActiveModel = row.into();
            active.last_used_at = Set(Some(Utc::now().to_rfc3339()));
            active.update(&self.conn).await?;
        }
        Ok(())
    }

    pub async fn delete_for_user(&self, id: i32, user_id: i32) -> Result<bool> {
        let result = stored_credentials::Entity::delete_many()
            .filter(stored_credentials::Column::Id.eq(id))
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete credential")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count_for_user(&self, user_id: i32) -> Result<u64> {
        Ok(stored_credentials::Entity::find()
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_for_user_by_status(&self, user_id: i32, status: &str) -> Result<u64> {
        Ok(stored_credentials::Entity::find()
            .filter(stored_credentials::Column::UserId.eq(user_id))
            .filter(stored_credentials::Column::Status.eq(status))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_for_provider(&self, provider_id: i32) -> Result<u64> {
        Ok(stored_credentials::Entity::find()
            .filter(stored_credentials::Column::ProviderId.eq(provider_id))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_all(&self) -> Result<u64> {
        Ok(stored_credentials::Entity::find().count(&self.conn).await?)
    }

    /// Lifecycle status is evaluated lazily: an active credential whose
    /// expiry has passed flips to "expired" the next time it is read.
    async fn expire_if_due(
        &self,
        row: stored_credentials::Model,
    ) -> Result<stored_credentials::Model> {
        let due = row.status == "active"
            && row
                .expires_at
                .as_deref()
                .and_then(super::user::parse_timestamp)
                .is_some_and(|expiry| expiry < Utc::now());

        if !due {
            return Ok(row);
        }

        let mut active: stored_credentials::ActiveModel = row.into();
        active.status = Set("expired".to_string());
        active.updated_at = Set(Utc::now().to_rfc3339());
        Ok(active.update(&self.conn).await?)
    }
}
