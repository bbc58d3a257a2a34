pub mod prelude;

pub mod api_models;
pub mod api_providers;
pub mod audit_logs;
pub mod login_history;
pub mod stored_credentials;
pub mod totp_configs;
pub mod users;
