//! Domain service for account security.
//!
//! Handles registration, the login state machine (lockout, CAPTCHA,
//! password, TOTP), password changes, account deletion, and the TOTP
//! lifecycle including dual-code secret rotation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::membership::MembershipStatus;

/// Errors specific to authentication operations.
///
/// Bad password, bad TOTP code, and bad CAPTCHA all collapse into
/// [`AuthError::InvalidCredentials`] so responses never reveal which check
/// failed. Lockout is the one deliberate exception: the state is not a
/// secret once an attempt has been made.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username, password, or verification code")]
    InvalidCredentials,

    #[error("Account temporarily locked, try again later")]
    Locked,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Two-factor authentication is not enabled")]
    TotpNotEnabled,

    #[error("Two-factor authentication is already enabled")]
    TotpAlreadyEnabled,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(format!("token error: {err}"))
    }
}

/// User info DTO for responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub membership_tier: String,
    pub is_active: bool,
    pub totp_enabled: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

/// Login result: bearer token plus user and membership state.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub access_token: String,
    pub user: UserInfo,
    pub membership: MembershipStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub captcha_token: Option<String>,
    #[serde(default)]
    pub captcha_answer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
    #[serde(default)]
    pub captcha_token: Option<String>,
    #[serde(default)]
    pub captcha_answer: Option<String>,
}

/// Request-scoped client metadata for audit trails.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotpStatus {
    pub is_enabled: bool,
    pub created_at: Option<String>,
}

/// A freshly generated secret plus its authenticator enrollment URI.
/// Only returned once; the caller is responsible for showing it to the
/// user and never logging it.
#[derive(Debug, Clone, Serialize)]
pub struct TotpEnrollment {
    pub secret: String,
    pub enrollment_uri: String,
}

/// Domain service trait for account security.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a new account after validation and (in production) CAPTCHA.
    async fn register(&self, req: RegisterRequest, client: ClientMeta)
    -> Result<UserInfo, AuthError>;

    /// Runs the full login state machine and issues an access token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Locked`] while the lockout window is open,
    /// [`AuthError::InvalidCredentials`] for any failed verification.
    async fn login(&self, req: LoginRequest, client: ClientMeta) -> Result<LoginResult, AuthError>;

    async fn get_user_info(&self, user_id: i32) -> Result<UserInfo, AuthError>;

    /// Changes a user's password after verifying the current one.
    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Deletes the account and everything attached to it. Requires the
    /// password as confirmation.
    async fn delete_account(&self, user_id: i32, password: &str) -> Result<(), AuthError>;

    async fn totp_status(&self, user_id: i32) -> Result<TotpStatus, AuthError>;

    /// Generates a pending secret for initial enrollment.
    async fn totp_setup(&self, user_id: i32) -> Result<TotpEnrollment, AuthError>;

    /// Enables TOTP once the user proves possession of the pending secret.
    async fn totp_enable(&self, user_id: i32, code: &str) -> Result<(), AuthError>;

    /// Checks a code against the enabled secret (step-up verification for
    /// sensitive operations).
    async fn totp_verify(&self, user_id: i32, code: &str) -> Result<bool, AuthError>;

    /// Issues a candidate secret for rotation. Nothing is committed yet.
    async fn totp_rotate_begin(&self, user_id: i32) -> Result<TotpEnrollment, AuthError>;

    /// Commits a rotation: requires one valid code against the OLD secret
    /// and one against the NEW secret. Any mismatch aborts with the
    /// existing secret intact.
    async fn totp_rotate_confirm(
        &self,
        user_id: i32,
        old_code: &str,
        new_code: &str,
        new_secret: &str,
    ) -> Result<(), AuthError>;

    /// Disables TOTP; requires the password and a current code.
    async fn totp_disable(&self, user_id: i32, password: &str, code: &str)
    -> Result<(), AuthError>;
}
