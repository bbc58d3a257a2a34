use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: Option<i32>,

    pub username: Option<String>,

    /// "login", "create_key", "delete_key", ...
    pub action: String,

    /// "API_KEY", "USER", "PROVIDER", "MODEL", "SYSTEM"
    pub resource_type: Option<String>,

    pub resource_id: Option<i32>,

    pub resource_name: Option<String>,

    pub ip_address: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,

    /// "success" or "failed"
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// JSON blob with extra context; never contains secret material.
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
