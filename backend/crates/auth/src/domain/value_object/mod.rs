//! Value Object Module

pub mod account_id;
pub mod account_role;
pub mod account_status;
pub mod backup_code;
pub mod email;
pub mod oauth_provider;
pub mod password;
pub mod public_id;
pub mod totp_secret;
