//! Security primitives: key derivation, credential encryption, TOTP,
//! CAPTCHA tokens, access tokens, and the dynamic admin path.

pub mod admin_path;
pub mod captcha;
pub mod cipher;
pub mod kdf;
pub mod tokens;
pub mod totp;

pub use admin_path::AdminPath;
pub use cipher::{CipherError, CredentialCipher, key_preview};
pub use tokens::AccessClaims;
