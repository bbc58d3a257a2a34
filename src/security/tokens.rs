//! Bearer access tokens (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Username.
    pub sub: String,
    pub uid: i32,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue_access_token(
    user_id: i32,
    username: &str,
    role: &str,
    secret: &[u8],
    lifetime_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: username.to_string(),
        uid: user_id,
        role: role.to_string(),
        exp: usize::try_from((now + Duration::hours(lifetime_hours)).timestamp()).unwrap_or(0),
        iat: usize::try_from(now.timestamp()).unwrap_or(0),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Returns the claims when the token is valid and unexpired.
#[must_use]
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .ok()
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"token-test-secret";

    #[test]
    fn issue_and_verify_round_trip() {
        let token = issue_access_token(7, "alice", "user", SECRET, 24).unwrap();
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, 7);
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_access_token(7, "alice", "user", SECRET, 24).unwrap();
        assert!(verify_access_token(&token, b"other").is_none());
    }

    #[test]
    fn expired_token_rejected() {
        // Negative lifetime backdates the expiry past the default leeway.
        let token = issue_access_token(7, "alice", "user", SECRET, -1).unwrap();
        assert!(verify_access_token(&token, SECRET).is_none());
    }
}
