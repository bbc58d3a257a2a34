//! AES-256-GCM encryption for stored provider credentials.
//!
//! Stored tokens are base64-encoded `nonce || ciphertext || tag` with a
//! random 12-byte nonce per message, so encrypting the same plaintext twice
//! yields different tokens. GCM authentication means a tampered token fails
//! to decrypt instead of yielding a plausible wrong plaintext.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

use crate::constants::security::PREVIEW_MASK_THRESHOLD;
use crate::security::kdf;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Deliberately opaque: callers must not be able to distinguish a wrong key
/// from corrupted ciphertext.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("failed to encrypt credential")]
    Encrypt,

    #[error("failed to decrypt credential")]
    Decrypt,
}

pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from the configured master secret and salt.
    #[must_use]
    pub fn new(master_secret: &str, salt: &[u8]) -> Self {
        let key = kdf::derive_key(master_secret.as_bytes(), salt);
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|_| CipherError::Decrypt)?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::Decrypt);
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &combined[NONCE_SIZE..])
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}

/// Non-reversible display preview, computed once at write time so the UI
/// never needs to decrypt. Short inputs are fully masked.
#[must_use]
pub fn key_preview(plaintext: &str) -> String {
    let chars: Vec<char> = plaintext.chars().collect();
    if chars.len() <= PREVIEW_MASK_THRESHOLD {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new("test-master-secret", b"0123456789abcdef")
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = test_cipher();
        let plaintext = "sk-test-1234567890";
        let token = cipher.encrypt(plaintext).unwrap();
        assert_ne!(token, plaintext);
        assert_eq!(cipher.decrypt(&token).unwrap(), plaintext);
    }

    #[test]
    fn nonce_randomization() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-plaintext").unwrap();
        let b = cipher.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "same-plaintext");
        assert_eq!(cipher.decrypt(&b).unwrap(), "same-plaintext");
    }

    #[test]
    fn tampered_token_fails() {
        let cipher = test_cipher();
        let token = cipher.encrypt("sk-sensitive-value").unwrap();

        let mut raw = base64::engine::general_purpose::STANDARD
            .decode(&token)
            .unwrap();
        let mid = raw.len() / 2;
        raw[mid] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(&raw);

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = test_cipher();
        let other = CredentialCipher::new("another-master-secret", b"0123456789abcdef");
        let token = cipher.encrypt("secret").unwrap();
        assert!(other.decrypt(&token).is_err());
    }

    #[test]
    fn garbage_token_fails() {
        let cipher = test_cipher();
        assert!(cipher.decrypt("not-base64!!!").is_err());
        assert!(cipher.decrypt("c2hvcnQ=").is_err());
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let cipher = test_cipher();
        let token = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), "");
    }

    #[test]
    fn preview_shapes() {
        assert_eq!(key_preview("sk-test-1234567890"), "sk-t...7890");
        assert_eq!(key_preview("12345678"), "********");
        assert_eq!(key_preview("abc"), "***");
        assert_eq!(key_preview(""), "");
        assert_eq!(key_preview("123456789"), "1234...6789");
    }
}
