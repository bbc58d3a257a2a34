use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::security::ENCRYPTION_SALT_LEN;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub membership: MembershipConfig,

    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/keyhaven.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Base URL used when reporting the admin console location.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8750,
            cors_allowed_origins: vec![
                "http://localhost:8750".to_string(),
                "http://127.0.0.1:8750".to_string(),
            ],
            public_base_url: "http://localhost:8750".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Deployment environment flag: "development" or "production".
    /// Production requires the master secret and encryption salt to be set
    /// and enables CAPTCHA gating on login and registration.
    pub environment: String,

    /// Master secret for token signing and encryption key derivation.
    /// Overridden by `KEYHAVEN_MASTER_SECRET`; must be non-empty in production.
    pub master_secret: String,

    /// Fixed 16-byte salt for the credential encryption KDF.
    /// Overridden by `KEYHAVEN_ENCRYPTION_SALT`; required in production.
    pub encryption_salt: String,

    /// Access token lifetime in hours.
    pub access_token_hours: i64,

    /// Length of the per-process admin path token.
    pub admin_path_length: usize,

    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            master_secret: "dev-master-secret-change-me".to_string(),
            encryption_salt: "dev-salt-16bytes".to_string(),
            access_token_hours: 24,
            admin_path_length: crate::constants::admin::PATH_LENGTH,
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Shared token for payment webhook signatures.
    /// Overridden by `KEYHAVEN_WEBHOOK_TOKEN`.
    pub webhook_token: String,

    /// Stored-credential quota per tier. -1 means unlimited.
    pub free_key_limit: i64,
    pub basic_key_limit: i64,
    pub pro_key_limit: i64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            webhook_token: String::new(),
            free_key_limit: 5,
            basic_key_limit: 50,
            pro_key_limit: -1,
        }
    }
}

impl MembershipConfig {
    /// Credential quota for a tier; -1 means unlimited.
    #[must_use]
    pub fn key_limit_for(&self, tier: &str) -> i64 {
        match tier {
            crate::constants::membership::TIER_BASIC => self.basic_key_limit,
            crate::constants::membership::TIER_PRO => self.pro_key_limit,
            _ => self.free_key_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Six-field cron expression for the membership sweep.
    /// Default: daily at 02:00.
    pub cron_expression: Option<String>,

    /// Fallback interval when no cron expression is set.
    pub sweep_interval_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: Some("0 0 2 * * *".to_string()),
            sweep_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            membership: MembershipConfig::default(),
            scheduler: SchedulerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secret material comes from the environment when present, so that
    /// config files checked into a host never need to carry it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KEYHAVEN_ENV")
            && !v.is_empty()
        {
            self.security.environment = v;
        }
        if let Ok(v) = std::env::var("KEYHAVEN_MASTER_SECRET")
            && !v.is_empty()
        {
            self.security.master_secret = v;
        }
        if let Ok(v) = std::env::var("KEYHAVEN_ENCRYPTION_SALT")
            && !v.is_empty()
        {
            self.security.encryption_salt = v;
        }
        if let Ok(v) = std::env::var("KEYHAVEN_WEBHOOK_TOKEN")
            && !v.is_empty()
        {
            self.membership.webhook_token = v;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keyhaven").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".keyhaven").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    /// Boot-time validation. A production deployment without its secret
    /// material must refuse to start rather than run with defaults.
    pub fn validate(&self) -> Result<()> {
        if self.security.is_production() {
            if self.security.master_secret.is_empty()
                || self.security.master_secret == SecurityConfig::default().master_secret
            {
                anyhow::bail!(
                    "master secret is not configured; set KEYHAVEN_MASTER_SECRET in production"
                );
            }
            if self.security.encryption_salt.len() != ENCRYPTION_SALT_LEN
                || self.security.encryption_salt == SecurityConfig::default().encryption_salt
            {
                anyhow::bail!(
                    "encryption salt must be exactly {ENCRYPTION_SALT_LEN} bytes; \
                     set KEYHAVEN_ENCRYPTION_SALT in production"
                );
            }
            if self.membership.webhook_token.is_empty() {
                tracing::warn!(
                    "webhook token not configured; payment callbacks will be rejected"
                );
            }
        } else if self.security.encryption_salt.len() != ENCRYPTION_SALT_LEN {
            anyhow::bail!("encryption salt must be exactly {ENCRYPTION_SALT_LEN} bytes");
        }

        if self.scheduler.enabled
            && self.scheduler.sweep_interval_hours == 0
            && self.scheduler.cron_expression.is_none()
        {
            anyhow::bail!("Scheduler interval must be > 0 or cron expression must be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.environment, "development");
        assert_eq!(config.security.encryption_salt.len(), ENCRYPTION_SALT_LEN);
        assert_eq!(config.membership.free_key_limit, 5);
        assert_eq!(config.membership.key_limit_for("pro"), -1);
        assert!(config.scheduler.cron_expression.is_some());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_production_requires_secrets() {
        let mut config = Config::default();
        config.security.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.security.master_secret = "an-actual-production-secret".to_string();
        assert!(config.validate().is_err());

        config.security.encryption_salt = "prod-salt-16byte".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_salt_length_enforced() {
        let mut config = Config::default();
        config.security.encryption_salt = "too-short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [membership]
            free_key_limit = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.membership.free_key_limit, 3);

        assert_eq!(config.server.port, 8750);
    }
}
