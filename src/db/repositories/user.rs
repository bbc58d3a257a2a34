use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::constants::lockout::{LOCKOUT_MINUTES, MAX_LOGIN_ATTEMPTS};
use crate::constants::membership::{PAID_TIERS, TIER_FREE};
use crate::entities::users;

/// User data returned from the repository (without the password hash).
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub membership_tier: String,
    pub membership_expire_at: Option<String>,
    pub membership_started_at: Option<String>,
    pub is_active: bool,
    pub login_attempts: i32,
    pub locked_until: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: model.role,
            membership_tier: model.membership_tier,
            membership_expire_at: model.membership_expire_at,
            membership_started_at: model.membership_started_at,
            is_active: model.is_active,
            login_attempts: model.login_attempts,
            locked_until: model.locked_until,
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl User {
    /// Lock state is evaluated lazily against the wall clock; there is no
    /// background unlock timer.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_until
            .as_deref()
            .and_then(parse_timestamp)
            .is_some_and(|until| until > Utc::now())
    }

    #[must_use]
    pub fn membership_expired(&self) -> bool {
        PAID_TIERS.contains(&self.membership_tier.as_str())
            && self
                .membership_expire_at
                .as_deref()
                .and_then(parse_timestamp)
                .is_some_and(|expiry| expiry < Utc::now())
    }
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Outcome of recording a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttemptOutcome {
    Counted { attempts: i32 },
    Locked,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        config: &SecurityConfig,
    ) -> Result<User> {
        let password = password.to_string();
        let config = config.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, Some(&config)))
            .await
            .context("Password hashing task panicked")??;

        let now = Utc::now().to_rfc3339();
        let user = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            role: Set("user".to_string()),
            membership_tier: Set(TIER_FREE.to_string()),
            is_active: Set(true),
            login_attempts: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        Ok(User::from(user))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Verify a password for a user.
    /// Note: this uses `spawn_blocking` because Argon2 hashing is
    /// CPU-intensive and would block the async runtime if run directly.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Update password for a user (hashes the new password).
    pub async fn update_password(
        &self,
        username: &str,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {username}"))?;

        let password = new_password.to_string();
        let config = config.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, Some(&config)))
            .await
            .context("Password hashing task panicked")??;

        let now = Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Record a failed verification (wrong password or wrong TOTP code).
    /// Crossing the attempt threshold starts the lockout window.
    pub async fn record_failed_attempt(&self, user_id: i32) -> Result<FailedAttemptOutcome> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for attempt tracking")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let attempts = user.login_attempts + 1;
        let now = Utc::now();

        let mut active: users::ActiveModel = user.into();
        active.login_attempts = Set(attempts);
        active.updated_at = Set(now.to_rfc3339());

        let outcome = if attempts >= MAX_LOGIN_ATTEMPTS {
            active.locked_until = Set(Some(
                (now + Duration::minutes(LOCKOUT_MINUTES)).to_rfc3339(),
            ));
            FailedAttemptOutcome::Locked
        } else {
            FailedAttemptOutcome::Counted { attempts }
        };

        active.update(&self.conn).await?;
        Ok(outcome)
    }

    /// Reset the failure counters after a successful verification.
    pub async fn record_successful_login(&self, user_id: i32) -> Result<()> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for login reset")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let now = Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = user.into();
        active.login_attempts = Set(0);
        active.locked_until = Set(None);
        active.last_login = Set(Some(now.clone()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn set_role(&self, user_id: i32, role: &str) -> Result<()> {
        self.update_fields(user_id, |active| {
            active.role = Set(role.to_string());
        })
        .await
    }

    pub async fn set_active(&self, user_id: i32, is_active: bool) -> Result<()> {
        self.update_fields(user_id, |active| {
            active.is_active = Set(is_active);
        })
        .await
    }

    pub async fn update_membership(
        &self,
        user_id: i32,
        tier: &str,
        expire_at: Option<String>,
        started_at: Option<String>,
    ) -> Result<()> {
        self.update_fields(user_id, |active| {
            active.membership_tier = Set(tier.to_string());
            active.membership_expire_at = Set(expire_at.clone());
            if started_at.is_some() {
                active.membership_started_at = Set(started_at.clone());
            }
        })
        .await
    }

    /// Downgrade to free, keeping the expiry record for later renewal.
    pub async fn downgrade_to_free(&self, user_id: i32) -> Result<()> {
        self.update_fields(user_id, |active| {
            active.membership_tier = Set(TIER_FREE.to_string());
        })
        .await
    }

    /// Paid users whose membership expiry is in the past.
    pub async fn find_expired_memberships(&self) -> Result<Vec<User>> {
        let candidates = users::Entity::find()
            .filter(users::Column::MembershipTier.is_in(PAID_TIERS.iter().copied()))
            .filter(users::Column::MembershipExpireAt.is_not_null())
            .filter(users::Column::IsActive.eq(true))
            .all(&self.conn)
            .await
            .context("Failed to query membership candidates")?;

        Ok(candidates
            .into_iter()
            .map(User::from)
            .filter(User::membership_expired)
            .collect())
    }

    pub async fn delete(&self, user_id: i32) -> Result<bool> {
        let result = users::Entity::delete_by_id(user_id)
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        search: Option<&str>,
    ) -> Result<(Vec<User>, u64)> {
        let mut query = users::Entity::find().order_by_asc(users::Column::Id);

        if let Some(term) = search {
            let pattern = format!("%{term}%");
            query = query.filter(
                users::Column::Username
                    .like(pattern.clone())
                    .or(users::Column::Email.like(pattern)),
            );
        }

        let paginator = query.paginate(&self.conn, per_page);
        let total_pages = paginator.num_pages().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((rows.into_iter().map(User::from).collect(), total_pages))
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(users::Entity::find().count(&self.conn).await?)
    }

    pub async fn count_active(&self) -> Result<u64> {
        Ok(users::Entity::find()
            .filter(users::Column::IsActive.eq(true))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_created_since(&self, since: &str) -> Result<u64> {
        Ok(users::Entity::find()
            .filter(users::Column::CreatedAt.gte(since))
            .count(&self.conn)
            .await?)
    }

    async fn update_fields<F>(&self, user_id: i32, apply: F) -> Result<()>
    where
        F: FnOnce(&mut users::ActiveModel),
    {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let mut active: users::ActiveModel = user.into();
        apply(&mut active);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;
        Ok(())
    }
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None, // output length (use default)
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_state_parses_timestamps() {
        let mut user = User {
            id: 1,
            username: "u".into(),
            email: "u@example.com".into(),
            role: "user".into(),
            membership_tier: "free".into(),
            membership_expire_at: None,
            membership_started_at: None,
            is_active: true,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!user.is_locked());

        user.locked_until = Some((Utc::now() + Duration::minutes(5)).to_rfc3339());
        assert!(user.is_locked());

        user.locked_until = Some((Utc::now() - Duration::minutes(5)).to_rfc3339());
        assert!(!user.is_locked());

        user.locked_until = Some("garbage".into());
        assert!(!user.is_locked());
    }

    #[test]
    fn membership_expiry_only_counts_paid_tiers() {
        let past = (Utc::now() - Duration::days(1)).to_rfc3339();
        let mut user = User {
            id: 1,
            username: "u".into(),
            email: "u@example.com".into(),
            role: "user".into(),
            membership_tier: "free".into(),
            membership_expire_at: Some(past.clone()),
            membership_started_at: None,
            is_active: true,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!user.membership_expired());

        user.membership_tier = "basic".into();
        assert!(user.membership_expired());

        user.membership_expire_at = Some((Utc::now() + Duration::days(1)).to_rfc3339());
        assert!(!user.membership_expired());
    }
}
