use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::{audit_logs, login_history};

/// One audited action. Details must never contain secret material.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i32>,
    pub resource_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

impl AuditEntry {
    #[must_use]
    pub fn success(action: &str) -> Self {
        Self {
            action: action.to_string(),
            status: "success".to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn failed(action: &str, error: &str) -> Self {
        Self {
            action: action.to_string(),
            status: "failed".to_string(),
            error_message: Some(error.to_string()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn by(mut self, user_id: i32, username: &str) -> Self {
        self.user_id = Some(user_id);
        self.username = Some(username.to_string());
        self
    }

    #[must_use]
    pub fn on(mut self, resource_type: &str, resource_id: Option<i32>, name: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = resource_id;
        self.resource_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn from_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn log(&self, entry: AuditEntry) -> Result<()> {
        audit_logs::ActiveModel {
            user_id: Set(entry.user_id),
            username: Set(entry.username),
            action: Set(entry.action),
            resource_type: Set(entry.resource_type),
            resource_id: Set(entry.resource_id),
            resource_name: Set(entry.resource_name),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            status: Set(entry.status),
            error_message: Set(entry.error_message),
            details: Set(entry.details),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert audit log")?;
        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: i32,
        page: u64,
        per_page: u64,
        action_filter: Option<&str>,
    ) -> Result<(Vec<audit_logs::Model>, u64)> {
        let mut query = audit_logs::Entity::find()
            .filter(audit_logs::Column::UserId.eq(user_id))
            .order_by_desc(audit_logs::Column::Id);

        if let Some(action) = action_filter {
            query = query.filter(audit_logs::Column::Action.eq(action));
        }

        let paginator = query.paginate(&self.conn, per_page);
        let total_pages = paginator.num_pages().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total_pages))
    }

    pub async fn recent_for_user(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<audit_logs::Model>> {
        Ok(audit_logs::Entity::find()
            .filter(audit_logs::Column::UserId.eq(user_id))
            .order_by_desc(audit_logs::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    pub async fn actions_for_user(&self, user_id: i32) -> Result<Vec<String>> {
        let rows: Vec<String> = audit_logs::Entity::find()
            .filter(audit_logs::Column::UserId.eq(user_id))
            .select_only()
            .column(audit_logs::Column::Action)
            .distinct()
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(rows)
    }

    pub async fn record_login(
        &self,
        user_id: i32,
        ip_address: Option<String>,
        user_agent: Option<String>,
        login_type: &str,
        status: &str,
        fail_reason: Option<&str>,
    ) -> Result<()> {
        login_history::ActiveModel {
            user_id: Set(user_id),
            ip_address: Set(ip_address),
            user_agent: Set(user_agent),
            login_type: Set(login_type.to_string()),
            status: Set(status.to_string()),
            fail_reason: Set(fail_reason.map(ToString::to_string)),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert login history")?;
        Ok(())
    }

    pub async fn login_history_for_user(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<login_history::Model>> {
        Ok(login_history::Entity::find()
            .filter(login_history::Column::UserId.eq(user_id))
            .order_by_desc(login_history::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }
}
