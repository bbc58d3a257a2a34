pub use super::api_models::Entity as ApiModels;
pub use super::api_providers::Entity as ApiProviders;
pub use super::audit_logs::Entity as AuditLogs;
pub use super::login_history::Entity as LoginHistory;
pub use super::stored_credentials::Entity as StoredCredentials;
pub use super::totp_configs::Entity as TotpConfigs;
pub use super::users::Entity as Users;
