pub mod auth_service;
pub use auth_service::{AuthError, AuthService};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod membership;
pub use membership::{MembershipService, MembershipStatus, OrderOutcome, PaymentOrder};
