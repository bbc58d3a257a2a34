use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stable slug ("openai", "anthropic", "custom_3_...").
    #[sea_orm(unique)]
    pub name: String,

    pub display_name: String,

    pub base_url: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub icon: Option<String>,

    pub is_active: bool,

    /// Custom providers are visible only to their creator.
    pub is_custom: bool,

    pub created_by: Option<i32>,

    pub sort_order: i32,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::api_models::Entity")]
    Models,

    #[sea_orm(has_many = "super::stored_credentials::Entity")]
    StoredCredentials,
}

impl Related<super::api_models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Models.def()
    }
}

impl Related<super::stored_credentials::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoredCredentials.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
