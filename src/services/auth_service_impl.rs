//! `SeaORM` implementation of the `AuthService` trait.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::SecurityConfig;
use crate::constants::security::MIN_PASSWORD_LENGTH;
use crate::db::{AuditEntry, FailedAttemptOutcome, Store, User};
use crate::security::{captcha, tokens, totp};
use crate::services::auth_service::{
    AuthError, AuthService, ClientMeta, LoginRequest, LoginResult, RegisterRequest, TotpEnrollment,
    TotpStatus, UserInfo,
};
use crate::services::membership::MembershipService;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,50}$").expect("valid regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
    membership: MembershipService,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, security: SecurityConfig) -> Self {
        let membership = MembershipService::new(store.clone());
        Self {
            store,
            security,
            membership,
        }
    }

    fn signing_key(&self) -> &[u8] {
        self.security.master_secret.as_bytes()
    }

    /// CAPTCHA is a production gate only; development skips it.
    fn check_captcha(&self, token: Option<&str>, answer: Option<&str>) -> Result<(), AuthError> {
        if !self.security.is_production() {
            return Ok(());
        }
        let (Some(token), Some(answer)) = (token, answer) else {
            return Err(AuthError::InvalidCredentials);
        };
        if captcha::verify(self.signing_key(), token, answer) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn user_info(&self, user: &User) -> Result<UserInfo, AuthError> {
        let totp_enabled = self
            .store
            .get_totp_config(user.id)
            .await?
            .is_some_and(|c| c.is_enabled);

        Ok(UserInfo {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            membership_tier: user.membership_tier.clone(),
            is_active: user.is_active,
            totp_enabled,
            last_login: user.last_login.clone(),
            created_at: user.created_at.clone(),
        })
    }

    async fn record_failure(
        &self,
        user: &User,
        client: &ClientMeta,
        login_type: &str,
        reason: &str,
    ) -> Result<AuthError, AuthError> {
        let outcome = self.store.record_failed_attempt(user.id).await?;
        self.store
            .record_login_history(
                user.id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                login_type,
                "failed",
                Some(reason),
            )
            .await?;

        Ok(match outcome {
            FailedAttemptOutcome::Locked => AuthError::Locked,
            FailedAttemptOutcome::Counted { .. } => AuthError::InvalidCredentials,
        })
    }

    async fn require_user(&self, user_id: i32) -> Result<User, AuthError> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn verify_own_password(&self, user: &User, password: &str) -> Result<(), AuthError> {
        let ok = self
            .store
            .verify_user_password(&user.username, password)
            .await?;
        if ok {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        req: RegisterRequest,
        client: ClientMeta,
    ) -> Result<UserInfo, AuthError> {
        if !USERNAME_RE.is_match(&req.username) {
            return Err(AuthError::Validation(
                "Username must be 3-50 characters of letters, digits, '-' or '_'".to_string(),
            ));
        }
        if !EMAIL_RE.is_match(&req.email) {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }
        if req.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        self.check_captcha(req.captcha_token.as_deref(), req.captcha_answer.as_deref())?;

        if self
            .store
            .get_user_by_username(&req.username)
            .await?
            .is_some()
        {
            return Err(AuthError::Validation(
                "Username is already taken".to_string(),
            ));
        }
        if self.store.get_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::Validation(
                "Email is already registered".to_string(),
            ));
        }

        let user = self
            .store
            .create_user(&req.username, &req.email, &req.password, &self.security)
            .await?;

        self.store
            .log_audit(
                AuditEntry::success("register")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username)
                    .from_client(client.ip_address, client.user_agent),
            )
            .await?;

        self.user_info(&user).await
    }

    async fn login(&self, req: LoginRequest, client: ClientMeta) -> Result<LoginResult, AuthError> {
        let Some(user) = self.store.get_user_by_username(&req.username).await? else {
            // Deliberately indistinguishable from a wrong password.
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        // Lockout is checked before any verification: a correct password
        // does not short-circuit an open lockout window. The window clears
        // lazily once `locked_until` is in the past.
        if user.is_locked() {
            self.store
                .record_login_history(
                    user.id,
                    client.ip_address.clone(),
                    client.user_agent.clone(),
                    "password",
                    "failed",
                    Some("account locked"),
                )
                .await?;
            return Err(AuthError::Locked);
        }

        self.check_captcha(req.captcha_token.as_deref(), req.captcha_answer.as_deref())?;

        let password_ok = self
            .store
            .verify_user_password(&req.username, &req.password)
            .await?;
        if !password_ok {
            return Err(self
                .record_failure(&user, &client, "password", "wrong password")
                .await?);
        }

        // Optional second factor: wrong or missing codes count toward the
        // same lockout counter as wrong passwords.
        let mut login_type = "password";
        if let Some(config) = self
            .store
            .get_totp_config(user.id)
            .await?
            .filter(|c| c.is_enabled)
        {
            login_type = "totp";
            let code = req.totp_code.as_deref().unwrap_or("");
            if !totp::verify(&config.secret, code) {
                return Err(self
                    .record_failure(&user, &client, "totp", "wrong totp code")
                    .await?);
            }
        }

        self.store.record_successful_login(user.id).await?;

        let membership = self.membership.status_for(&user).await?;

        self.store
            .record_login_history(
                user.id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                login_type,
                "success",
                None,
            )
            .await?;
        self.store
            .log_audit(
                AuditEntry::success("login")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username)
                    .from_client(client.ip_address, client.user_agent),
            )
            .await?;

        let access_token = tokens::issue_access_token(
            user.id,
            &user.username,
            &user.role,
            self.signing_key(),
            self.security.access_token_hours,
        )?;

        // Reflect a lazy downgrade in the response.
        let user = self.require_user(user.id).await?;
        let user_info = self.user_info(&user).await?;

        Ok(LoginResult {
            access_token,
            user: user_info,
            membership,
        })
    }

    async fn get_user_info(&self, user_id: i32) -> Result<UserInfo, AuthError> {
        let user = self.require_user(user_id).await?;
        self.user_info(&user).await
    }

    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "New password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let user = self.require_user(user_id).await?;
        self.verify_own_password(&user, current_password).await?;

        self.store
            .update_user_password(&user.username, new_password, &self.security)
            .await?;

        self.store
            .log_audit(
                AuditEntry::success("change_password")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;

        Ok(())
    }

    async fn delete_account(&self, user_id: i32, password: &str) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        self.verify_own_password(&user, password).await?;

        // Stored credentials and the TOTP config go with the user row via
        // cascade.
        self.store.delete_user(user.id).await?;

        self.store
            .log_audit(
                AuditEntry::success("delete_account")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;

        Ok(())
    }

    async fn totp_status(&self, user_id: i32) -> Result<TotpStatus, AuthError> {
        let config = self.store.get_totp_config(user_id).await?;
        Ok(TotpStatus {
            is_enabled: config.as_ref().is_some_and(|c| c.is_enabled),
            created_at: config.map(|c| c.created_at),
        })
    }

    async fn totp_setup(&self, user_id: i32) -> Result<TotpEnrollment, AuthError> {
        let user = self.require_user(user_id).await?;

        if self
            .store
            .get_totp_config(user_id)
            .await?
            .is_some_and(|c| c.is_enabled)
        {
            return Err(AuthError::TotpAlreadyEnabled);
        }

        let secret = totp::generate_secret();
        self.store
            .upsert_pending_totp_secret(user_id, &secret)
            .await?;

        Ok(TotpEnrollment {
            enrollment_uri: totp::enrollment_uri(&user.username, &secret),
            secret,
        })
    }

    async fn totp_enable(&self, user_id: i32, code: &str) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        let config = self
            .store
            .get_totp_config(user_id)
            .await?
            .ok_or(AuthError::TotpNotEnabled)?;

        if config.is_enabled {
            return Err(AuthError::TotpAlreadyEnabled);
        }
        if !totp::verify(&config.secret, code) {
            return Err(AuthError::InvalidCredentials);
        }

        self.store.set_totp_enabled(user_id, true).await?;
        self.store
            .log_audit(
                AuditEntry::success("totp_enable")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;
        Ok(())
    }

    async fn totp_verify(&self, user_id: i32, code: &str) -> Result<bool, AuthError> {
        let config = self
            .store
            .get_totp_config(user_id)
            .await?
            .filter(|c| c.is_enabled)
            .ok_or(AuthError::TotpNotEnabled)?;

        Ok(totp::verify(&config.secret, code))
    }

    async fn totp_rotate_begin(&self, user_id: i32) -> Result<TotpEnrollment, AuthError> {
        let user = self.require_user(user_id).await?;

        self.store
            .get_totp_config(user_id)
            .await?
            .filter(|c| c.is_enabled)
            .ok_or(AuthError::TotpNotEnabled)?;

        // Candidate only; the stored secret is untouched until the
        // dual-code confirmation succeeds.
        let secret = totp::generate_secret();
        Ok(TotpEnrollment {
            enrollment_uri: totp::enrollment_uri(&user.username, &secret),
            secret,
        })
    }

    async fn totp_rotate_confirm(
        &self,
        user_id: i32,
        old_code: &str,
        new_code: &str,
        new_secret: &str,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        let config = self
            .store
            .get_totp_config(user_id)
            .await?
            .filter(|c| c.is_enabled)
            .ok_or(AuthError::TotpNotEnabled)?;

        if new_secret.len() != 32 || totp::current_code(new_secret).is_none() {
            return Err(AuthError::Validation("Malformed secret".to_string()));
        }

        // Both proofs or nothing: the old device must still be present and
        // the new one must already work, otherwise the rotation aborts and
        // the existing secret stays valid.
        if !totp::verify(&config.secret, old_code) {
            return Err(AuthError::InvalidCredentials);
        }
        if !totp::verify(new_secret, new_code) {
            return Err(AuthError::InvalidCredentials);
        }

        self.store.replace_totp_secret(user_id, new_secret).await?;
        self.store
            .log_audit(
                AuditEntry::success("totp_rotate")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;
        Ok(())
    }

    async fn totp_disable(
        &self,
        user_id: i32,
        password: &str,
        code: &str,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        let config = self
            .store
            .get_totp_config(user_id)
            .await?
            .filter(|c| c.is_enabled)
            .ok_or(AuthError::TotpNotEnabled)?;

        self.verify_own_password(&user, password).await?;
        if !totp::verify(&config.secret, code) {
            return Err(AuthError::InvalidCredentials);
        }

        self.store.delete_totp_config(user_id).await?;
        self.store
            .log_audit(
                AuditEntry::success("totp_disable")
                    .by(user.id, &user.username)
                    .on("USER", Some(user.id), &user.username),
            )
            .await?;
        Ok(())
    }
}
