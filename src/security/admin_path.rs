//! Dynamic admin path.
//!
//! A random path segment generated once at process start hides the admin
//! console and its API prefix from scanners. The value lives only in
//! process memory and is injected into the router and handlers through
//! shared state; it is never persisted, so a restart invalidates any
//! previously discovered path. Obscurity only: every admin route is still
//! gated by role-based authorization.
//!
//! Discovery happens out-of-band on first run (the startup log prints the
//! console URL) and afterwards through the authenticated `/api/admin-path`
//! endpoint.

use rand::Rng;

use crate::constants::admin::PATH_CHARSET;

#[derive(Debug, Clone)]
pub struct AdminPath {
    token: String,
}

impl AdminPath {
    /// Generate a fresh token from the CSPRNG-backed thread rng.
    #[must_use]
    pub fn generate(length: usize) -> Self {
        let mut rng = rand::rng();
        let token = (0..length)
            .map(|_| char::from(PATH_CHARSET[rng.random_range(0..PATH_CHARSET.len())]))
            .collect();
        Self { token }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// URL path of the admin console page.
    #[must_use]
    pub fn page_path(&self) -> String {
        format!("/sec/{}.html", self.token)
    }

    /// Prefix under which the admin API routes are mounted.
    #[must_use]
    pub fn api_prefix(&self) -> String {
        format!("/api/sec/{}", self.token)
    }

    #[must_use]
    pub fn console_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.page_path())
    }

    /// Exact match against the console page path (with or without `.html`).
    #[must_use]
    pub fn verify_page(&self, request_path: &str) -> bool {
        request_path == format!("/sec/{}", self.token) || request_path == self.page_path()
    }

    /// Prefix match against the admin API mount point.
    #[must_use]
    pub fn verify_api(&self, request_path: &str) -> bool {
        request_path.starts_with(&self.api_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::admin::PATH_LENGTH;

    #[test]
    fn token_has_requested_length_and_charset() {
        let path = AdminPath::generate(PATH_LENGTH);
        assert_eq!(path.token().len(), PATH_LENGTH);
        for c in path.token().chars() {
            assert!(PATH_CHARSET.contains(&(c as u8)), "unexpected char {c}");
        }
    }

    #[test]
    fn ambiguous_chars_excluded() {
        for _ in 0..50 {
            let path = AdminPath::generate(PATH_LENGTH);
            for banned in ['l', '1', 'o', '0'] {
                assert!(!path.token().contains(banned));
            }
        }
    }

    #[test]
    fn two_generations_differ() {
        let a = AdminPath::generate(PATH_LENGTH);
        let b = AdminPath::generate(PATH_LENGTH);
        assert_ne!(a.token(), b.token());
    }

    #[test]
    fn page_verification() {
        let path = AdminPath::generate(PATH_LENGTH);
        assert!(path.verify_page(&format!("/sec/{}", path.token())));
        assert!(path.verify_page(&format!("/sec/{}.html", path.token())));
        assert!(!path.verify_page("/sec/somethingelse"));
        assert!(!path.verify_page("/admin.html"));
    }

    #[test]
    fn api_verification() {
        let path = AdminPath::generate(PATH_LENGTH);
        assert!(path.verify_api(&format!("/api/sec/{}/users", path.token())));
        assert!(!path.verify_api("/api/sec/wrongtoken/users"));
        assert!(!path.verify_api("/api/admin/users"));
    }
}
