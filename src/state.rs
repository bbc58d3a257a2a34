use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::security::{AdminPath, CredentialCipher};
use crate::services::{AuthService, MembershipService, SeaOrmAuthService};

/// Build a shared HTTP client with reasonable defaults for outbound calls
/// (credential connectivity tests). Reused so connections pool.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("Keyhaven/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    /// Process-lifetime immutable value, generated once at startup.
    pub admin_path: Arc<AdminPath>,

    pub cipher: Arc<CredentialCipher>,

    pub auth_service: Arc<dyn AuthService>,

    pub membership: Arc<MembershipService>,

    pub http_client: reqwest::Client,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let admin_path = Arc::new(AdminPath::generate(config.security.admin_path_length));

        let cipher = Arc::new(CredentialCipher::new(
            &config.security.master_secret,
            config.security.encryption_salt.as_bytes(),
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.security.clone(),
        ));

        let membership = Arc::new(MembershipService::new(store.clone()));

        let http_client = build_shared_http_client()?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            admin_path,
            cipher,
            auth_service,
            membership,
            http_client,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
