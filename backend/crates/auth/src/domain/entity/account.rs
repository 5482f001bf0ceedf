//! Account Entity
//!
//! Core account profile entity containing non-sensitive data.
//! Sensitive auth data lives in the Credentials entity.

use chrono::{DateTime, Utc};

use crate::domain::value_object::{
    account_id::AccountId, account_role::AccountRole, account_status::AccountStatus, email::Email,
    public_id::PublicId,
};

/// Account entity
#[derive(Debug, Clone)]
pub struct Account {
    /// Internal UUID identifier
    pub account_id: AccountId,
    /// Public-facing nanoid identifier (URL-safe)
    pub public_id: PublicId,
    /// Email address (unique, case-normalized)
    pub email: Email,
    /// Display name shown in bookings and reviews
    pub display_name: String,
    /// Avatar image URL (may come from an OAuth provider)
    pub avatar_url: Option<String>,
    /// Role (User, Guide, Admin)
    pub role: AccountRole,
    /// Status (Active, Disabled)
    pub status: AccountStatus,
    /// Last successful sign-in time
    pub last_login_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account
    pub fn new(email: Email, display_name: String) -> Self {
        let now = Utc::now();

        Self {
            account_id: AccountId::new(),
            public_id: PublicId::new(),
            email,
            display_name,
            avatar_url: None,
            role: AccountRole::default(),
            status: AccountStatus::default(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record successful sign-in
    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    /// Check if the account can sign in
    pub fn can_login(&self) -> bool {
        self.status.can_login()
    }

    /// Set the avatar URL if none is present (OAuth backfill)
    pub fn backfill_avatar(&mut self, avatar_url: Option<String>) {
        if self.avatar_url.is_none() && avatar_url.is_some() {
            self.avatar_url = avatar_url;
            self.updated_at = Utc::now();
        }
    }

    /// Update display name
    pub fn set_display_name(&mut self, display_name: String) {
        self.display_name = display_name;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(
            Email::new("traveler@example.com").unwrap(),
            "Traveler".to_string(),
        )
    }

    #[test]
    fn test_new_account_defaults() {
        let a = account();
        assert_eq!(a.role, AccountRole::User);
        assert_eq!(a.status, AccountStatus::Active);
        assert!(a.last_login_at.is_none());
        assert!(a.can_login());
    }

    #[test]
    fn test_backfill_avatar_only_when_absent() {
        let mut a = account();
        a.backfill_avatar(Some("https://cdn.example.com/a.png".to_string()));
        assert_eq!(
            a.avatar_url.as_deref(),
            Some("https://cdn.example.com/a.png")
        );

        // A second backfill does not overwrite
        a.backfill_avatar(Some("https://cdn.example.com/b.png".to_string()));
        assert_eq!(
            a.avatar_url.as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }
}
