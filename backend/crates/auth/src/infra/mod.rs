//! Infrastructure Layer
//!
//! Repository and gateway implementations against external systems.

pub mod oauth_http;
pub mod postgres;

pub use oauth_http::HttpOAuthGateway;
pub use postgres::PgAuthRepository;
