//! RFC 6238 time-based one-time passwords for the optional second factor.

use std::time::{SystemTime, UNIX_EPOCH};

use totp_rs::{Algorithm, Secret, TOTP};

use crate::constants::totp::{DIGITS, ISSUER, SKEW_STEPS, STEP_SECONDS};

/// Generate a fresh base32 secret (20 random bytes, 32 characters, no
/// padding) from the OS random source.
#[must_use]
pub fn generate_secret() -> String {
    match Secret::generate_secret().to_encoded() {
        Secret::Encoded(encoded) => encoded,
        // to_encoded always returns the Encoded variant.
        Secret::Raw(_) => unreachable!(),
    }
}

/// Verify a code against the current time step, tolerating `SKEW_STEPS`
/// steps of clock drift either side. Malformed secrets or codes verify
/// false rather than erroring.
#[must_use]
pub fn verify(secret: &str, code: &str) -> bool {
    verify_at(secret, code, now_timestamp())
}

/// Verification against an explicit unix timestamp.
#[must_use]
pub fn verify_at(secret: &str, code: &str, timestamp: u64) -> bool {
    build(secret).is_some_and(|totp| totp.check(code, timestamp))
}

/// The code a conformant authenticator app would show at `timestamp`.
#[must_use]
pub fn code_at(secret: &str, timestamp: u64) -> Option<String> {
    build(secret).map(|totp| totp.generate(timestamp))
}

/// The code for the current time step.
#[must_use]
pub fn current_code(secret: &str) -> Option<String> {
    code_at(secret, now_timestamp())
}

/// Standard enrollment payload for authenticator apps. QR rendering is the
/// frontend's concern; the backend only emits the URI.
#[must_use]
pub fn enrollment_uri(username: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}",
        issuer = urlencoding::encode(ISSUER),
        account = urlencoding::encode(username),
    )
}

fn build(secret: &str) -> Option<TOTP> {
    // Authenticator apps may hand secrets back padded or lowercased.
    let normalized: String = secret
        .trim()
        .trim_end_matches('=')
        .to_ascii_uppercase();
    let bytes = Secret::Encoded(normalized).to_bytes().ok()?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW_STEPS, STEP_SECONDS, bytes).ok()
}

fn now_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 1_700_000_000;

    #[test]
    fn secret_is_32_base32_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(!secret.contains('='));
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn current_step_code_verifies() {
        let secret = generate_secret();
        let code = code_at(&secret, T).unwrap();
        assert!(verify_at(&secret, &code, T));
    }

    #[test]
    fn adjacent_step_codes_verify() {
        let secret = generate_secret();
        let prev = code_at(&secret, T - STEP_SECONDS).unwrap();
        let next = code_at(&secret, T + STEP_SECONDS).unwrap();
        assert!(verify_at(&secret, &prev, T));
        assert!(verify_at(&secret, &next, T));
    }

    #[test]
    fn drifted_code_rejected() {
        let secret = generate_secret();
        // Two full steps away exceeds the +/-1 step tolerance.
        let stale = code_at(&secret, T - 2 * STEP_SECONDS).unwrap();
        let future = code_at(&secret, T + 2 * STEP_SECONDS).unwrap();
        assert!(!verify_at(&secret, &stale, T));
        assert!(!verify_at(&secret, &future, T));
    }

    #[test]
    fn wrong_code_rejected() {
        let secret = generate_secret();
        let code = code_at(&secret, T).unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!verify_at(&secret, wrong, T));
    }

    #[test]
    fn malformed_secret_verifies_false() {
        assert!(!verify_at("not a secret!!", "123456", T));
        assert!(!verify_at("", "123456", T));
    }

    #[test]
    fn padded_and_lowercased_secret_accepted() {
        let secret = generate_secret();
        let code = code_at(&secret, T).unwrap();
        let padded = format!("{}====", secret.to_ascii_lowercase());
        assert!(verify_at(&padded, &code, T));
    }

    #[test]
    fn enrollment_uri_format() {
        let uri = enrollment_uri("alice", "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP");
        assert_eq!(
            uri,
            "otpauth://totp/Keyhaven:alice?secret=JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP&issuer=Keyhaven"
        );
    }

    #[test]
    fn enrollment_uri_escapes_username() {
        let uri = enrollment_uri("a b", "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP");
        assert!(uri.contains("Keyhaven:a%20b"));
    }
}
