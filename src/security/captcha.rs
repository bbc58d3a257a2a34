//! CAPTCHA challenges for pre-authentication gating.
//!
//! The server never stores challenge state: the expected answer travels
//! back to the client inside a signed, short-lived token (HS256, 300 s),
//! lowercase-normalized so verification is case-insensitive. Expired or
//! malformed tokens simply verify false.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::security::{CAPTCHA_EXPIRE_SECONDS, CAPTCHA_LENGTH};

const CHALLENGE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Serialize, Deserialize)]
struct CaptchaClaims {
    answer: String,
    exp: usize,
}

pub struct CaptchaChallenge {
    /// Signed token the client must echo back alongside its answer.
    pub token: String,
    /// Inline SVG rendering of the challenge text.
    pub image_svg: String,
}

/// Issue a new challenge signed with the master secret.
pub fn issue(signing_key: &[u8]) -> Result<CaptchaChallenge, jsonwebtoken::errors::Error> {
    let text = generate_text(CAPTCHA_LENGTH);
    let token = issue_for_answer(signing_key, &text, unix_now() + CAPTCHA_EXPIRE_SECONDS)?;
    Ok(CaptchaChallenge {
        token,
        image_svg: render_svg(&text),
    })
}

/// Compare the user's input against the token's embedded answer,
/// case-insensitively. Any token failure (bad signature, expired,
/// malformed) is a plain `false`.
#[must_use]
pub fn verify(signing_key: &[u8], token: &str, user_input: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    // The 300 second lifetime is exact; no default leeway.
    validation.leeway = 0;

    decode::<CaptchaClaims>(token, &DecodingKey::from_secret(signing_key), &validation)
        .map(|data| data.claims.answer == user_input.trim().to_lowercase())
        .unwrap_or(false)
}

fn issue_for_answer(
    signing_key: &[u8],
    answer: &str,
    expires_at: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = CaptchaClaims {
        answer: answer.to_lowercase(),
        exp: usize::try_from(expires_at).unwrap_or(usize::MAX),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
}

fn generate_text(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CHALLENGE_CHARSET[rng.random_range(0..CHALLENGE_CHARSET.len())]))
        .collect()
}

/// Minimal SVG rendering with per-glyph jitter. Rasterization stays a
/// frontend concern.
fn render_svg(text: &str) -> String {
    let mut rng = rand::rng();
    let mut glyphs = String::new();
    for (i, c) in text.chars().enumerate() {
        let x = 14 + i * 26;
        let y = rng.random_range(24..34);
        let rotate = rng.random_range(-12..=12);
        glyphs.push_str(&format!(
            "<text x=\"{x}\" y=\"{y}\" transform=\"rotate({rotate} {x} {y})\" \
             font-family=\"monospace\" font-size=\"26\" fill=\"#333\">{c}</text>"
        ));
    }
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"120\" height=\"40\" \
         viewBox=\"0 0 120 40\"><rect width=\"120\" height=\"40\" fill=\"#f5f5f5\"/>\
         <line x1=\"0\" y1=\"20\" x2=\"120\" y2=\"28\" stroke=\"#ccc\"/>{glyphs}</svg>"
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"captcha-test-signing-key";

    #[test]
    fn case_insensitive_verification() {
        let token = issue_for_answer(KEY, "AB12", unix_now() + 60).unwrap();
        assert!(verify(KEY, &token, "ab12"));
        assert!(verify(KEY, &token, "AB12"));
        assert!(verify(KEY, &token, " ab12 "));
        assert!(!verify(KEY, &token, "ab13"));
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_for_answer(KEY, "AB12", unix_now().saturating_sub(10)).unwrap();
        assert!(!verify(KEY, &token, "ab12"));
    }

    #[test]
    fn malformed_token_rejected() {
        assert!(!verify(KEY, "garbage", "ab12"));
        assert!(!verify(KEY, "", "ab12"));
    }

    #[test]
    fn wrong_signing_key_rejected() {
        let token = issue_for_answer(KEY, "AB12", unix_now() + 60).unwrap();
        assert!(!verify(b"other-key", &token, "ab12"));
    }

    #[test]
    fn issued_challenge_round_trips() {
        let challenge = issue(KEY).unwrap();
        assert!(challenge.image_svg.starts_with("<svg"));
        // The rendered glyphs are the answer; extract and verify them.
        let answer: String = challenge
            .image_svg
            .split('>')
            .filter_map(|chunk| {
                let c = chunk.strip_suffix("</text")?;
                c.chars().last()
            })
            .collect();
        assert_eq!(answer.len(), CAPTCHA_LENGTH);
        assert!(verify(KEY, &challenge.token, &answer));
    }

    #[test]
    fn challenge_text_uses_charset() {
        let text = generate_text(8);
        assert_eq!(text.len(), 8);
        for c in text.chars() {
            assert!(CHALLENGE_CHARSET.contains(&(c as u8)));
        }
    }
}
