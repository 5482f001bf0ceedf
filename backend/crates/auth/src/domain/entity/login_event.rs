//! Login Event Entity
//!
//! One row of the per-account sign-in history. Every terminal sign-in
//! outcome (success or failure, any method) appends an event; the store
//! keeps the history capped by evicting the oldest rows.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::value_object::{account_id::AccountId, oauth_provider::OAuthProvider};

/// How the sign-in was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    Password,
    Totp,
    BackupCode,
    OAuth(OAuthProvider),
}

impl LoginMethod {
    /// Stable string code for storage
    pub fn code(&self) -> String {
        match self {
            LoginMethod::Password => "password".to_string(),
            LoginMethod::Totp => "totp".to_string(),
            LoginMethod::BackupCode => "backup_code".to_string(),
            LoginMethod::OAuth(provider) => format!("oauth_{}", provider.code()),
        }
    }

    /// Parse from a stored code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "password" => Some(LoginMethod::Password),
            "totp" => Some(LoginMethod::Totp),
            "backup_code" => Some(LoginMethod::BackupCode),
            other => other
                .strip_prefix("oauth_")
                .and_then(OAuthProvider::from_code)
                .map(LoginMethod::OAuth),
        }
    }
}

/// Login history event
#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub id: Uuid,
    pub account_id: AccountId,
    pub success: bool,
    pub method: LoginMethod,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoginEvent {
    pub fn new(
        account_id: AccountId,
        success: bool,
        method: LoginMethod,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            success,
            method,
            client_ip,
            user_agent,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_code_roundtrip() {
        let methods = [
            LoginMethod::Password,
            LoginMethod::Totp,
            LoginMethod::BackupCode,
            LoginMethod::OAuth(OAuthProvider::Google),
            LoginMethod::OAuth(OAuthProvider::Vk),
        ];

        for method in methods {
            assert_eq!(LoginMethod::from_code(&method.code()), Some(method));
        }

        assert_eq!(LoginMethod::from_code("oauth_facebook"), None);
        assert_eq!(LoginMethod::from_code("carrier_pigeon"), None);
    }
}
