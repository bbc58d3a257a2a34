use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "stored_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    pub provider_id: Option<i32>,

    /// Display name, unique per user.
    pub key_name: String,

    /// Opaque authenticated-encryption token (base64 nonce||ct||tag).
    #[sea_orm(column_type = "Text")]
    pub key_ciphertext: String,

    /// Non-secret preview ("sk-t...7890"), derived once at write time.
    pub key_preview: String,

    /// Optional model binding.
    pub model_id: Option<String>,

    /// "active", "inactive" or "expired"
    pub status: String,

    pub expires_at: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    pub created_at: String,

    pub updated_at: String,

    pub last_used_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::api_providers::Entity",
        from = "Column::ProviderId",
        to = "super::api_providers::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Provider,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::api_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
