//! Trusted Device Entity
//!
//! A device the account holder has asked to remember after completing
//! 2FA. Trust is identified by an opaque server-generated token held in a
//! cookie; presenting it at sign-in skips the 2FA step while the grant is
//! unexpired.
//!
//! Expiry is lazy: grants are checked at use, never swept.

use chrono::{DateTime, Duration, Utc};

use crate::domain::value_object::account_id::AccountId;

/// Length of the opaque device token in bytes (hex doubles it)
const DEVICE_TOKEN_BYTES: usize = 32;

/// Trusted device entity
#[derive(Debug, Clone)]
pub struct TrustedDevice {
    /// Opaque server-generated identifier (secure random token)
    pub device_id: String,
    /// Owning account
    pub account_id: AccountId,
    /// Human-readable label ("Firefox on Linux")
    pub display_name: String,
    /// Raw User-Agent at the time of trust
    pub user_agent: Option<String>,
    /// When the grant was created
    pub created_at: DateTime<Utc>,
    /// Last time this device was seen at sign-in
    pub last_used_at: DateTime<Utc>,
}

impl TrustedDevice {
    /// Create a new trust grant with a fresh opaque token
    pub fn new(account_id: AccountId, display_name: String, user_agent: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            device_id: platform::crypto::random_token_hex(DEVICE_TOKEN_BYTES),
            account_id,
            display_name,
            user_agent,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Check whether the grant has outlived its TTL at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.created_at + ttl
    }

    /// Check whether the grant is expired now
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(Utc::now(), ttl)
    }

    /// Record use of this device
    pub fn touch(&mut self) {
        self.last_used_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> TrustedDevice {
        TrustedDevice::new(
            AccountId::new(),
            "Firefox on Linux".to_string(),
            Some("Mozilla/5.0".to_string()),
        )
    }

    #[test]
    fn test_token_is_opaque_and_unique() {
        let a = device();
        let b = device();
        assert_eq!(a.device_id.len(), DEVICE_TOKEN_BYTES * 2);
        assert_ne!(a.device_id, b.device_id);
    }

    #[test]
    fn test_expiry_boundary() {
        let d = device();
        let ttl = Duration::days(30);

        assert!(!d.is_expired_at(d.created_at + Duration::days(29), ttl));
        assert!(d.is_expired_at(d.created_at + Duration::days(30), ttl));
        assert!(d.is_expired_at(d.created_at + Duration::days(31), ttl));
    }
}
