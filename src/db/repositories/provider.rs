use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::entities::{api_models, api_providers};

pub struct ProviderRepository {
    conn: DatabaseConnection,
}

impl ProviderRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Providers a user may attach credentials to: active globals plus the
    /// user's own custom entries.
    pub async fn visible_for_user(&self, user_id: i32) -> Result<Vec<api_providers::Model>> {
        let rows = api_providers::Entity::find()
            .filter(api_providers::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(api_providers::Column::IsCustom.eq(false))
                    .add(api_providers::Column::CreatedBy.eq(user_id)),
            )
            .order_by_asc(api_providers::Column::SortOrder)
            .all(&self.conn)
            .await
            .context("Failed to list providers")?;
        Ok(rows)
    }

    pub async fn list_all(&self) -> Result<Vec<api_providers::Model>> {
        Ok(api_providers::Entity::find()
            .order_by_asc(api_providers::Column::SortOrder)
            .all(&self.conn)
            .await?)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<api_providers::Model>> {
        Ok(api_providers::Entity::find_by_id(id)
            .one(&self.conn)
            .await?)
    }

    pub async fn display_name_taken(&self, display_name: &str) -> Result<bool> {
        Ok(api_providers::Entity::find()
            .filter(api_providers::Column::DisplayName.eq(display_name))
            .count(&self.conn)
            .await?
            > 0)
    }

    pub async fn create(
        &self,
        name: &str,
        display_name: &str,
        base_url: &str,
        description: Option<String>,
        icon: Option<String>,
        is_custom: bool,
        created_by: Option<i32>,
    ) -> Result<api_providers::Model> {
        let sort_order = i32::try_from(self.count().await?).unwrap_or(i32::MAX - 1) + 1;
        let now = Utc::now().to_rfc3339();

        let model = api_providers::ActiveModel {
            name: Set(name.to_string()),
            display_name: Set(display_name.to_string()),
            base_url: Set(base_url.to_string()),
            description: Set(description),
            icon: Set(icon),
            is_active: Set(true),
            is_custom: Set(is_custom),
            created_by: Set(created_by),
            sort_order: Set(sort_order),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert provider")?;

        Ok(model)
    }

    pub async fn update(
        &self,
        id: i32,
        display_name: Option<String>,
        base_url: Option<String>,
        description: Option<String>,
        icon: Option<String>,
    ) -> Result<Option<api_providers::Model>> {
        let Some(row) = api_providers::Entity::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: api_providers::ActiveModel = row.into();
        if let Some(v) = display_name {
            active.display_name = Set(v);
        }
        if let Some(v) = base_url {
            active.base_url = Set(v);
        }
        if let Some(v) = description {
            active.description = Set(Some(v));
        }
        if let Some(v) = icon {
            active.icon = Set(Some(v));
        }
        active.updated_at = Set(Utc::now().to_rfc3339());

        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> Result<bool> {
        let Some(row) = api_providers::Entity::find_by_id(id).one(&self.conn).await? else {
            return Ok(false);
        };

        let mut active: api_providers::ActiveModel = row.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;
        Ok(true)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = api_providers::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete provider")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(api_providers::Entity::find().count(&self.conn).await?)
    }

    // Models

    /// Models under providers the user can see.
    pub async fn models_visible_for_user(&self, user_id: i32) -> Result<Vec<api_models::Model>> {
        let providers = self.visible_for_user(user_id).await?;
        let ids: Vec<i32> = providers.iter().map(|p| p.id).collect();

        Ok(api_models::Entity::find()
            .filter(api_models::Column::ProviderId.is_in(ids))
            .order_by_asc(api_models::Column::ProviderId)
            .order_by_asc(api_models::Column::SortOrder)
            .all(&self.conn)
            .await?)
    }

    pub async fn models_for_provider(&self, provider_id: i32) -> Result<Vec<api_models::Model>> {
        Ok(api_models::Entity::find()
            .filter(api_models::Column::ProviderId.eq(provider_id))
            .order_by_asc(api_models::Column::SortOrder)
            .all(&self.conn)
            .await?)
    }

    pub async fn list_models(&self) -> Result<Vec<api_models::Model>> {
        Ok(api_models::Entity::find()
            .order_by_asc(api_models::Column::ProviderId)
            .order_by_asc(api_models::Column::SortOrder)
            .all(&self.conn)
            .await?)
    }

    pub async fn get_model(&self, id: i32) -> Result<Option<api_models::Model>> {
        Ok(api_models::Entity::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn create_model(
        &self,
        provider_id: i32,
        model_id: &str,
        model_name: Option<String>,
        category: &str,
        context_window: Option<String>,
    ) -> Result<api_models::Model> {
        let now = Utc::now().to_rfc3339();
        let model = api_models::ActiveModel {
            provider_id: Set(provider_id),
            model_id: Set(model_id.to_string()),
            model_name: Set(model_name),
            category: Set(category.to_string()),
            context_window: Set(context_window),
            is_default: Set(false),
            sort_order: Set(0),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert model")?;

        Ok(model)
    }

    pub async fn update_model(
        &self,
        id: i32,
        model_name: Option<String>,
        category: Option<String>,
        context_window: Option<String>,
    ) -> Result<Option<api_models::Model>> {
        let Some(row) = api_models::Entity::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: api_models::ActiveModel = row.into();
        if let Some(v) = model_name {
            active.model_name = Set(Some(v));
        }
        if let Some(v) = category {
            active.category = Set(v);
        }
        if let Some(v) = context_window {
            active.context_window = Set(Some(v));
        }

        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn delete_model(&self, id: i32) -> Result<bool> {
        let result = api_models::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete model")?;
        Ok(result.rows_affected > 0)
    }
}
