use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub provider_id: i32,

    /// Provider-facing identifier, e.g. "gpt-4o".
    pub model_id: String,

    pub model_name: Option<String>,

    /// "chat", "code", "long_context", "economy", "vision"
    pub category: String,

    /// Display string, e.g. "128K".
    pub context_window: Option<String>,

    pub is_default: bool,

    pub sort_order: i32,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::api_providers::Entity",
        from = "Column::ProviderId",
        to = "super::api_providers::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Provider,
}

impl Related<super::api_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
