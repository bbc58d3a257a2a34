pub mod audit;
pub mod credential;
pub mod provider;
pub mod totp;
pub mod user;
