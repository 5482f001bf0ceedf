//! Entity Module

pub mod account;
pub mod auth_session;
pub mod credentials;
pub mod login_event;
pub mod oauth_identity;
pub mod trusted_device;
