use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// "admin" or "user"
    pub role: String,

    /// "free", "basic" or "pro"
    pub membership_tier: String,

    pub membership_expire_at: Option<String>,

    pub membership_started_at: Option<String>,

    pub is_active: bool,

    /// Consecutive failed verifications since the last success.
    pub login_attempts: i32,

    /// While in the future, all login attempts are rejected.
    pub locked_until: Option<String>,

    pub last_login: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stored_credentials::Entity")]
    StoredCredentials,

    #[sea_orm(has_one = "super::totp_configs::Entity")]
    TotpConfig,
}

impl Related<super::stored_credentials::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StoredCredentials.def()
    }
}

impl Related<super::totp_configs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TotpConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
