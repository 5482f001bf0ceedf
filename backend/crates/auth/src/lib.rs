//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Business logic, entities, repository traits
//! - `application/` - Use cases and application services
//! - `infra/` - Database implementations, OAuth provider client
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Account signup/signin with email + password
//! - TOTP-based 2FA (Google Authenticator compatible) with backup codes
//! - Trusted devices that skip the 2FA step
//! - OAuth sign-in (Google, GitHub, VK) with account linking
//! - Server-side sessions with cookie-based tokens
//! - Anti-forgery (CSRF) protection on state-changing routes
//!
//! ## Security Model
//! - Passwords hashed with Argon2id (NIST SP 800-63B compliant)
//! - TOTP secrets encrypted at rest (AES-256-GCM), backup codes stored hashed
//! - Sessions bound to client fingerprint (User-Agent)
//! - Automatic lockout after failed login attempts
//! - 2FA attempts throttled independently of the password lockout

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use infra::postgres::PgAuthRepository;
pub use presentation::router::auth_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod handlers {
    pub use crate::presentation::handlers::*;
}

pub mod store {
    pub use crate::infra::postgres::PgAuthRepository as AuthStore;
}

pub mod router {
    pub use crate::presentation::router::*;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}
