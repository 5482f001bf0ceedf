//! Repository Traits
//!
//! Interfaces for data persistence. Implementation is in infrastructure
//! layer.
//!
//! Counter-like mutations (lockout failures, backup-code consumption,
//! device-cap eviction, history pruning, 2FA throttling) are expressed as
//! single repository operations rather than read-modify-write sequences,
//! so the PostgreSQL implementation can make them one conditional
//! statement and concurrent requests cannot lose updates.

use chrono::Duration;
use platform::rate_limit::{RateLimitConfig, RateLimitResult};
use uuid::Uuid;

use crate::domain::entity::{
    account::Account, auth_session::AuthSession, credentials::Credentials,
    login_event::LoginEvent, oauth_identity::OAuthIdentity, trusted_device::TrustedDevice,
};
use crate::domain::value_object::{
    account_id::AccountId, backup_code::BackupCodeRecord, email::Email,
    oauth_provider::OAuthProvider, public_id::PublicId,
};
use crate::error::AuthResult;

/// Account repository trait
#[trait_variant::make(AccountRepository: Send)]
pub trait LocalAccountRepository {
    /// Create a new account
    async fn create(&self, account: &Account) -> AuthResult<()>;

    /// Find account by ID
    async fn find_by_id(&self, account_id: &AccountId) -> AuthResult<Option<Account>>;

    /// Find account by public ID
    async fn find_by_public_id(&self, public_id: &PublicId) -> AuthResult<Option<Account>>;

    /// Find account by (case-normalized) email
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Account>>;

    /// Check if an email is already registered
    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    /// Update account
    async fn update(&self, account: &Account) -> AuthResult<()>;
}

/// Credentials repository trait
#[trait_variant::make(CredentialsRepository: Send)]
pub trait LocalCredentialsRepository {
    /// Create credentials
    async fn create(&self, credentials: &Credentials) -> AuthResult<()>;

    /// Find credentials by account ID
    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Option<Credentials>>;

    /// Update credentials
    async fn update(&self, credentials: &Credentials) -> AuthResult<()>;

    /// Atomically record a failed sign-in attempt and return the new state
    ///
    /// Must apply the same transitions as
    /// [`Credentials::record_failure_at`]: no-op while locked, restart at 1
    /// after an expired lock, lock at `max_attempts`.
    async fn record_login_failure(
        &self,
        account_id: &AccountId,
        max_attempts: u16,
        lockout: Duration,
    ) -> AuthResult<Credentials>;

    /// Reset the failure counter after a successful sign-in
    async fn reset_login_failures(&self, account_id: &AccountId) -> AuthResult<()>;
}

/// Backup code repository trait
#[trait_variant::make(BackupCodeRepository: Send)]
pub trait LocalBackupCodeRepository {
    /// Replace the account's whole batch (regeneration invalidates old codes)
    async fn replace_all(
        &self,
        account_id: &AccountId,
        records: &[BackupCodeRecord],
    ) -> AuthResult<()>;

    /// Fetch all records for an account
    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<BackupCodeRecord>>;

    /// Atomically mark a code used; returns false when it was already
    /// spent (single-use enforcement lives here, not in the caller)
    async fn consume(&self, account_id: &AccountId, code_hash: &str) -> AuthResult<bool>;

    /// Count codes still available
    async fn count_unused(&self, account_id: &AccountId) -> AuthResult<u32>;
}

/// Trusted device repository trait
#[trait_variant::make(TrustedDeviceRepository: Send)]
pub trait LocalTrustedDeviceRepository {
    /// Insert a device, evicting the oldest grant when the account is at
    /// `cap`
    async fn insert_with_cap(&self, device: &TrustedDevice, cap: u32) -> AuthResult<()>;

    /// Find one device by its opaque ID
    async fn find(
        &self,
        account_id: &AccountId,
        device_id: &str,
    ) -> AuthResult<Option<TrustedDevice>>;

    /// List all devices for an account (newest first)
    async fn find_all(&self, account_id: &AccountId) -> AuthResult<Vec<TrustedDevice>>;

    /// Revoke a device; returns false when it did not exist
    async fn revoke(&self, account_id: &AccountId, device_id: &str) -> AuthResult<bool>;

    /// Update last-used timestamp
    async fn touch(&self, account_id: &AccountId, device_id: &str) -> AuthResult<()>;
}

/// OAuth identity repository trait
#[trait_variant::make(OAuthIdentityRepository: Send)]
pub trait LocalOAuthIdentityRepository {
    /// Create a link
    async fn create(&self, identity: &OAuthIdentity) -> AuthResult<()>;

    /// Find a link by its unique (provider, provider_id) pair
    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<OAuthIdentity>>;

    /// List links for an account
    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<OAuthIdentity>>;

    /// Remove a provider link; returns false when none existed
    async fn delete(&self, account_id: &AccountId, provider: OAuthProvider) -> AuthResult<bool>;

    /// Refresh the profile snapshot and last-used time
    async fn update_snapshot(&self, identity: &OAuthIdentity) -> AuthResult<()>;
}

/// Login history repository trait
#[trait_variant::make(LoginHistoryRepository: Send)]
pub trait LocalLoginHistoryRepository {
    /// Append an event, pruning the oldest rows beyond `cap`
    async fn append_with_cap(&self, event: &LoginEvent, cap: u32) -> AuthResult<()>;

    /// Fetch the most recent events (newest first)
    async fn find_recent(&self, account_id: &AccountId, limit: u32) -> AuthResult<Vec<LoginEvent>>;
}

/// 2FA attempt throttle repository trait
///
/// Separate from the password lockout counter: verification-code guessing
/// is limited per account without locking the password flow.
#[trait_variant::make(TwoFactorThrottleRepository: Send)]
pub trait LocalTwoFactorThrottleRepository {
    /// Count an attempt against the account's window
    async fn check_and_increment(
        &self,
        account_id: &AccountId,
        config: &RateLimitConfig,
    ) -> AuthResult<RateLimitResult>;

    /// Clear the window after a successful verification
    async fn reset(&self, account_id: &AccountId) -> AuthResult<()>;
}

/// Auth session repository trait
#[trait_variant::make(AuthSessionRepository: Send)]
pub trait LocalAuthSessionRepository {
    /// Create a new session
    async fn create(&self, session: &AuthSession) -> AuthResult<()>;

    /// Find session by ID and verify fingerprint
    async fn find_by_id(
        &self,
        session_id: Uuid,
        fingerprint_hash: &[u8],
    ) -> AuthResult<Option<AuthSession>>;

    /// Find all sessions for an account
    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<AuthSession>>;

    /// Update session (e.g., last activity)
    async fn update(&self, session: &AuthSession) -> AuthResult<()>;

    /// Delete a session
    async fn delete(&self, session_id: Uuid) -> AuthResult<()>;

    /// Delete all sessions for an account (except current)
    async fn delete_all_for_account(
        &self,
        account_id: &AccountId,
        except: Option<Uuid>,
    ) -> AuthResult<u64>;

    /// Clean up expired sessions
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
