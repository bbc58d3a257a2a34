pub mod security {
    /// PBKDF2-HMAC-SHA256 iteration count for the credential encryption key.
    pub const PBKDF2_ITERATIONS: u32 = 100_000;

    pub const DERIVED_KEY_LEN: usize = 32;

    /// Required length of the configured encryption salt, in bytes.
    pub const ENCRYPTION_SALT_LEN: usize = 16;

    /// Inputs of this length or shorter are fully masked in previews.
    pub const PREVIEW_MASK_THRESHOLD: usize = 8;

    pub const CAPTCHA_LENGTH: usize = 4;

    pub const CAPTCHA_EXPIRE_SECONDS: u64 = 300;

    pub const MIN_PASSWORD_LENGTH: usize = 8;
}

pub mod lockout {
    /// Consecutive failures (password or TOTP) before the account locks.
    pub const MAX_LOGIN_ATTEMPTS: i32 = 5;

    pub const LOCKOUT_MINUTES: i64 = 30;
}

pub mod totp {
    /// 20 raw bytes encode to exactly 32 base32 characters, no padding.
    pub const SECRET_BYTES: usize = 20;

    pub const DIGITS: usize = 6;

    pub const STEP_SECONDS: u64 = 30;

    /// Accepted clock-skew window, in steps either side of now.
    pub const SKEW_STEPS: u8 = 1;

    pub const ISSUER: &str = "Keyhaven";
}

pub mod admin {
    pub const PATH_LENGTH: usize = 16;

    /// Lowercase alphanumerics minus the visually ambiguous l, 1, o, 0.
    pub const PATH_CHARSET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";

    /// Fixed legacy paths that must 404 regardless of authentication.
    pub const BLOCKED_PAGE_PATHS: &[&str] = &[
        "/admin",
        "/admin.html",
        "/administrator",
        "/backend",
        "/console",
        "/control",
        "/manage",
        "/management",
        "/dashboard/admin",
    ];
}

pub mod membership {
    pub const TIER_FREE: &str = "free";
    pub const TIER_BASIC: &str = "basic";
    pub const TIER_PRO: &str = "pro";

    /// Paid tiers checked by the expiry sweep.
    pub const PAID_TIERS: &[&str] = &[TIER_BASIC, TIER_PRO];

    /// Order amounts at or above these thresholds select the tier.
    pub const PRO_MIN_AMOUNT: f64 = 49.0;
    pub const BASIC_MIN_AMOUNT: f64 = 19.0;

    pub const DAYS_PER_MONTH: i64 = 30;
}

pub mod limits {
    pub const DEFAULT_PAGE_SIZE: u64 = 20;

    pub const MAX_PAGE_SIZE: u64 = 100;

    pub const DEFAULT_LOG_LIMIT: u64 = 50;
}
