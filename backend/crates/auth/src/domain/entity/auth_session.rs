//! Auth Session Entity
//!
//! Represents an authenticated account session.
//! Stored in database with cookie-based token reference.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::value_object::{
    account_id::AccountId, account_role::AccountRole, public_id::PublicId,
};

/// Auth session entity
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Session ID (UUID v4)
    pub session_id: Uuid,
    /// Reference to Account
    pub account_id: AccountId,
    /// Public ID for API responses
    pub public_id: PublicId,
    /// Account role at session creation
    pub role: AccountRole,
    /// Session expiration (Unix timestamp ms)
    pub expires_at_ms: i64,
    /// Whether "Remember Me" was checked
    pub remember_me: bool,
    /// Client fingerprint hash (User-Agent based)
    pub client_fingerprint_hash: Vec<u8>,
    /// Client IP (optional, for logging)
    pub client_ip: Option<String>,
    /// User agent string (for session management display)
    pub user_agent: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_activity_at: DateTime<Utc>,
}

impl AuthSession {
    /// Create a new auth session
    ///
    /// TTL is provided by the application layer (config), not hard-coded here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: AccountId,
        public_id: PublicId,
        role: AccountRole,
        remember_me: bool,
        fingerprint_hash: Vec<u8>,
        client_ip: Option<String>,
        user_agent: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            session_id: Uuid::new_v4(),
            account_id,
            public_id,
            role,
            expires_at_ms: (now + ttl).timestamp_millis(),
            remember_me,
            client_fingerprint_hash: fingerprint_hash,
            client_ip,
            user_agent,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Check if session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expires_at_ms
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Get remaining time until expiration
    pub fn remaining_ms(&self) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        (self.expires_at_ms - now_ms).max(0)
    }

    /// Extend session if "Remember Me" is enabled
    ///
    /// The extension policy is intentionally simple:
    /// - only applies to remember_me sessions
    /// - extend to (now + ttl_long) when remaining time falls below half of ttl_long
    pub fn extend_if_needed(&mut self, ttl_long: Duration) {
        if !self.remember_me {
            return;
        }

        let now = Utc::now();
        let new_expires = (now + ttl_long).timestamp_millis();

        // Only extend if less than half the TTL remains
        if self.expires_at_ms < (now + (ttl_long / 2)).timestamp_millis() {
            self.expires_at_ms = new_expires;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(remember_me: bool, ttl: Duration) -> AuthSession {
        AuthSession::new(
            AccountId::new(),
            PublicId::new(),
            AccountRole::User,
            remember_me,
            vec![0u8; 32],
            None,
            None,
            ttl,
        )
    }

    #[test]
    fn test_fresh_session_not_expired() {
        let s = session(false, Duration::hours(1));
        assert!(!s.is_expired());
        assert!(s.remaining_ms() > 0);
    }

    #[test]
    fn test_extend_only_remember_me() {
        let mut s = session(false, Duration::minutes(1));
        let before = s.expires_at_ms;
        s.extend_if_needed(Duration::days(30));
        assert_eq!(s.expires_at_ms, before);

        let mut s = session(true, Duration::minutes(1));
        let before = s.expires_at_ms;
        s.extend_if_needed(Duration::days(30));
        assert!(s.expires_at_ms > before);
    }
}
