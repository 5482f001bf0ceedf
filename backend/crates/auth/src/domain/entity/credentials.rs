//! Credentials Entity
//!
//! Authentication credentials and lockout state for an account.
//! Separated from the Account entity to isolate sensitive data.
//!
//! The lockout state machine lives here so it can be unit-tested against
//! injected clocks; the PostgreSQL repository mirrors the same transitions
//! in a single conditional UPDATE so concurrent failures cannot lose
//! increments.

use chrono::{DateTime, Duration, Utc};

use crate::domain::value_object::{
    account_id::AccountId, password::PasswordHash, totp_secret::TotpSecret,
};

/// Credentials entity
///
/// Contains sensitive authentication data:
/// - Password hash (absent on OAuth-only accounts)
/// - TOTP secret (encrypted at rest)
/// - Login failure tracking and temporary lockout
/// - Per-account security settings
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Reference to Account
    pub account_id: AccountId,
    /// Hashed password; `None` for accounts created via OAuth
    pub password_hash: Option<PasswordHash>,
    /// TOTP secret for 2FA (encrypted envelope)
    pub totp_secret: Option<TotpSecret>,
    /// Whether TOTP 2FA is enabled and verified
    pub two_factor_enabled: bool,
    /// Consecutive sign-in failure count
    pub login_failed_count: u16,
    /// Last sign-in failure time
    pub last_failed_at: Option<DateTime<Utc>>,
    /// Account locked until (temporary lockout after failures)
    pub locked_until: Option<DateTime<Utc>>,
    /// When true, 2FA is asked even on trusted devices
    pub require_two_factor: bool,
    /// Whether this account participates in device trust at all
    pub trusted_devices_enabled: bool,
    /// Per-account session lifetime override in seconds; `None` uses the
    /// application default
    pub session_timeout_secs: Option<i32>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Credentials {
    /// Create new credentials with a password
    pub fn new(account_id: AccountId, password_hash: PasswordHash) -> Self {
        Self::build(account_id, Some(password_hash))
    }

    /// Create new credentials for an OAuth-only account (no password)
    pub fn new_passwordless(account_id: AccountId) -> Self {
        Self::build(account_id, None)
    }

    fn build(account_id: AccountId, password_hash: Option<PasswordHash>) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            password_hash,
            totp_secret: None,
            two_factor_enabled: false,
            login_failed_count: 0,
            last_failed_at: None,
            locked_until: None,
            require_two_factor: false,
            trusted_devices_enabled: true,
            session_timeout_secs: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Session lifetime override as a chrono Duration, when configured
    pub fn session_ttl_override(&self) -> Option<Duration> {
        self.session_timeout_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::seconds(secs as i64))
    }

    /// Whether a password is set (OAuth-only accounts have none)
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    // ------------------------------------------------------------------
    // Lockout state machine
    // ------------------------------------------------------------------

    /// Check if the account is locked at the given instant
    ///
    /// `locked_until` in the past means unlocked; the column is cleared
    /// lazily on the next transition, never by a sweeper.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(locked_until) => now < locked_until,
            None => false,
        }
    }

    /// Check if the account is currently locked
    pub fn is_locked(&self) -> bool {
        self.is_locked_at(Utc::now())
    }

    /// Seconds until the lock expires (0 when not locked)
    pub fn lock_remaining_secs_at(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(locked_until) if now < locked_until => (locked_until - now).num_seconds().max(1),
            _ => 0,
        }
    }

    /// Record a failed sign-in attempt
    ///
    /// Transitions:
    /// - locked and unexpired: no-op (the attempt was rejected before any
    ///   password work, so it must not extend the lock)
    /// - locked but expired: the count restarts at 1
    /// - otherwise: increment; reaching `max_attempts` sets the lock
    pub fn record_failure_at(
        &mut self,
        now: DateTime<Utc>,
        max_attempts: u16,
        lockout: Duration,
    ) {
        if let Some(locked_until) = self.locked_until {
            if now < locked_until {
                return;
            }
            // Expired lock: start a fresh count
            self.login_failed_count = 0;
            self.locked_until = None;
        }

        self.login_failed_count += 1;
        self.last_failed_at = Some(now);
        self.updated_at = now;

        if self.login_failed_count >= max_attempts {
            self.locked_until = Some(now + lockout);
        }
    }

    /// Reset failure count on successful sign-in
    pub fn reset_failures_at(&mut self, now: DateTime<Utc>) {
        self.login_failed_count = 0;
        self.last_failed_at = None;
        self.locked_until = None;
        self.updated_at = now;
    }

    // ------------------------------------------------------------------
    // Two-factor settings
    // ------------------------------------------------------------------

    /// Attach a freshly generated TOTP secret (not enabled until verified)
    pub fn set_totp_secret(&mut self, secret: TotpSecret) {
        self.totp_secret = Some(secret);
        self.two_factor_enabled = false;
        self.updated_at = Utc::now();
    }

    /// Enable TOTP after the first successful verification
    pub fn enable_totp(&mut self) {
        if self.totp_secret.is_some() {
            self.two_factor_enabled = true;
            self.updated_at = Utc::now();
        }
    }

    /// Disable TOTP and drop the secret
    pub fn disable_totp(&mut self) {
        self.totp_secret = None;
        self.two_factor_enabled = false;
        self.updated_at = Utc::now();
    }

    /// Check if 2FA applies to sign-in (secret present and enabled)
    pub fn requires_two_factor(&self) -> bool {
        self.two_factor_enabled && self.totp_secret.is_some()
    }

    /// Whether a trusted device may skip the 2FA step
    pub fn trusted_device_may_skip(&self) -> bool {
        self.trusted_devices_enabled && !self.require_two_factor
    }

    /// Update password
    pub fn set_password(&mut self, new_password: PasswordHash) {
        self.password_hash = Some(new_password);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MAX: u16 = 5;

    fn lockout() -> Duration {
        Duration::minutes(15)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new_passwordless(AccountId::new())
    }

    #[test]
    fn test_locks_after_max_failures() {
        let mut c = creds();
        let now = t0();

        for i in 1..MAX {
            c.record_failure_at(now, MAX, lockout());
            assert_eq!(c.login_failed_count, i);
            assert!(!c.is_locked_at(now));
        }

        c.record_failure_at(now, MAX, lockout());
        assert_eq!(c.login_failed_count, MAX);
        assert!(c.is_locked_at(now));
        assert_eq!(c.locked_until, Some(now + lockout()));
    }

    #[test]
    fn test_failure_on_locked_account_is_noop() {
        let mut c = creds();
        let now = t0();

        for _ in 0..MAX {
            c.record_failure_at(now, MAX, lockout());
        }
        let locked_until = c.locked_until;

        // Mid-lock attempt must not extend the lock or bump the count
        c.record_failure_at(now + Duration::minutes(5), MAX, lockout());
        assert_eq!(c.locked_until, locked_until);
        assert_eq!(c.login_failed_count, MAX);
    }

    #[test]
    fn test_expired_lock_restarts_count_at_one() {
        let mut c = creds();
        let now = t0();

        for _ in 0..MAX {
            c.record_failure_at(now, MAX, lockout());
        }
        assert!(c.is_locked_at(now));

        // Lock expires without any explicit reset
        let later = now + lockout() + Duration::seconds(1);
        assert!(!c.is_locked_at(later));

        c.record_failure_at(later, MAX, lockout());
        assert_eq!(c.login_failed_count, 1);
        assert!(!c.is_locked_at(later));
    }

    #[test]
    fn test_success_resets_everything() {
        let mut c = creds();
        let now = t0();

        c.record_failure_at(now, MAX, lockout());
        c.record_failure_at(now, MAX, lockout());
        c.reset_failures_at(now);

        assert_eq!(c.login_failed_count, 0);
        assert!(c.last_failed_at.is_none());
        assert!(c.locked_until.is_none());
    }

    #[test]
    fn test_lock_remaining_secs() {
        let mut c = creds();
        let now = t0();

        for _ in 0..MAX {
            c.record_failure_at(now, MAX, lockout());
        }

        assert_eq!(c.lock_remaining_secs_at(now), 15 * 60);
        assert_eq!(
            c.lock_remaining_secs_at(now + Duration::minutes(14)),
            60
        );
        assert_eq!(c.lock_remaining_secs_at(now + Duration::minutes(16)), 0);
    }

    #[test]
    fn test_totp_lifecycle() {
        let mut c = creds();
        assert!(!c.requires_two_factor());

        // Enabling without a secret does nothing
        c.enable_totp();
        assert!(!c.two_factor_enabled);

        c.set_totp_secret(TotpSecret::from_encrypted("aa:bb:cc"));
        assert!(!c.requires_two_factor()); // pending verification

        c.enable_totp();
        assert!(c.requires_two_factor());

        c.disable_totp();
        assert!(!c.requires_two_factor());
        assert!(c.totp_secret.is_none());
    }

    #[test]
    fn test_session_ttl_override() {
        let mut c = creds();
        assert!(c.session_ttl_override().is_none());

        c.session_timeout_secs = Some(3600);
        assert_eq!(c.session_ttl_override(), Some(Duration::hours(1)));

        // Zero and negative values are treated as unset
        c.session_timeout_secs = Some(0);
        assert!(c.session_ttl_override().is_none());
    }

    #[test]
    fn test_trusted_device_skip_respects_settings() {
        let mut c = creds();
        assert!(c.trusted_device_may_skip());

        c.require_two_factor = true;
        assert!(!c.trusted_device_may_skip());

        c.require_two_factor = false;
        c.trusted_devices_enabled = false;
        assert!(!c.trusted_device_may_skip());
    }
}
