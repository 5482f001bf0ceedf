//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, Base64)
//! - Authenticated encryption of stored secrets (AES-256-GCM)
//! - Anti-forgery (CSRF) token issuance and validation
//! - Password hashing (Argon2id, NIST SP 800-63B compliant)
//! - Cookie management
//! - Client fingerprinting
//! - Rate limiting infrastructure

pub mod cipher;
pub mod client;
pub mod cookie;
pub mod crypto;
pub mod csrf;
pub mod password;
pub mod rate_limit;
