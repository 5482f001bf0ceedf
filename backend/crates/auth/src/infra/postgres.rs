//! PostgreSQL Repository Implementations
//!
//! One pool-backed type implements every repository trait. Counter-like
//! operations (lockout failures, backup-code consumption, cap evictions,
//! the 2FA throttle window) are single conditional statements so
//! concurrent requests cannot lose updates.

use chrono::{DateTime, Duration, Utc};
use platform::rate_limit::{RateLimitConfig, RateLimitResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    account::Account,
    auth_session::AuthSession,
    credentials::Credentials,
    login_event::{LoginEvent, LoginMethod},
    oauth_identity::OAuthIdentity,
    trusted_device::TrustedDevice,
};
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, BackupCodeRepository, CredentialsRepository,
    LoginHistoryRepository, OAuthIdentityRepository, TrustedDeviceRepository,
    TwoFactorThrottleRepository,
};
use crate::domain::value_object::{
    account_id::AccountId, account_role::AccountRole, account_status::AccountStatus,
    backup_code::BackupCodeRecord, email::Email, oauth_provider::OAuthProvider,
    password::PasswordHash, public_id::PublicId, totp_secret::TotpSecret,
};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let deleted = sqlx::query("DELETE FROM auth_sessions WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(sessions_deleted = deleted, "Cleaned up expired auth sessions");

        Ok(deleted)
    }
}

// ============================================================================
// Account Repository Implementation
// ============================================================================

impl AccountRepository for PgAuthRepository {
    async fn create(&self, account: &Account) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                account_id,
                public_id,
                email,
                display_name,
                avatar_url,
                account_role,
                account_status,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.account_id.as_uuid())
        .bind(account.public_id.as_str())
        .bind(account.email.as_str())
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(account.role.id())
        .bind(account.status.id())
        .bind(account.last_login_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, account_id: &AccountId) -> AuthResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&account_select("account_id = $1"))
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_account()).transpose()
    }

    async fn find_by_public_id(&self, public_id: &PublicId) -> AuthResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&account_select("public_id = $1"))
            .bind(public_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_account()).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&account_select("email = $1"))
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_account()).transpose()
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)",
        )
        .bind(email.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn update(&self, account: &Account) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts SET
                email = $2,
                display_name = $3,
                avatar_url = $4,
                account_role = $5,
                account_status = $6,
                last_login_at = $7,
                updated_at = $8
            WHERE account_id = $1
            "#,
        )
        .bind(account.account_id.as_uuid())
        .bind(account.email.as_str())
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(account.role.id())
        .bind(account.status.id())
        .bind(account.last_login_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Credentials Repository Implementation
// ============================================================================

const CREDENTIALS_COLUMNS: &str = r#"
    account_id,
    password_hash,
    totp_secret,
    two_factor_enabled,
    login_failed_count,
    last_failed_at,
    locked_until,
    require_two_factor,
    trusted_devices_enabled,
    session_timeout_secs,
    created_at,
    updated_at
"#;

impl CredentialsRepository for PgAuthRepository {
    async fn create(&self, credentials: &Credentials) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account_credentials (
                account_id,
                password_hash,
                totp_secret,
                two_factor_enabled,
                login_failed_count,
                last_failed_at,
                locked_until,
                require_two_factor,
                trusted_devices_enabled,
                session_timeout_secs,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(credentials.account_id.as_uuid())
        .bind(credentials.password_hash.as_ref().map(|h| h.as_phc_string()))
        .bind(credentials.totp_secret.as_ref().map(|s| s.as_encrypted()))
        .bind(credentials.two_factor_enabled)
        .bind(credentials.login_failed_count as i16)
        .bind(credentials.last_failed_at)
        .bind(credentials.locked_until)
        .bind(credentials.require_two_factor)
        .bind(credentials.trusted_devices_enabled)
        .bind(credentials.session_timeout_secs)
        .bind(credentials.created_at)
        .bind(credentials.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Option<Credentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {CREDENTIALS_COLUMNS} FROM account_credentials WHERE account_id = $1"
        ))
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_credentials()).transpose()
    }

    async fn update(&self, credentials: &Credentials) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE account_credentials SET
                password_hash = $2,
                totp_secret = $3,
                two_factor_enabled = $4,
                login_failed_count = $5,
                last_failed_at = $6,
                locked_until = $7,
                require_two_factor = $8,
                trusted_devices_enabled = $9,
                session_timeout_secs = $10,
                updated_at = $11
            WHERE account_id = $1
            "#,
        )
        .bind(credentials.account_id.as_uuid())
        .bind(credentials.password_hash.as_ref().map(|h| h.as_phc_string()))
        .bind(credentials.totp_secret.as_ref().map(|s| s.as_encrypted()))
        .bind(credentials.two_factor_enabled)
        .bind(credentials.login_failed_count as i16)
        .bind(credentials.last_failed_at)
        .bind(credentials.locked_until)
        .bind(credentials.require_two_factor)
        .bind(credentials.trusted_devices_enabled)
        .bind(credentials.session_timeout_secs)
        .bind(credentials.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_login_failure(
        &self,
        account_id: &AccountId,
        max_attempts: u16,
        lockout: Duration,
    ) -> AuthResult<Credentials> {
        let now = Utc::now();
        let lock_until = now + lockout;

        // Same transitions as the entity state machine, in one statement:
        // an unexpired lock is untouched, an expired lock restarts the
        // count at 1, otherwise increment and lock on reaching the limit.
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            r#"
            UPDATE account_credentials SET
                login_failed_count = CASE
                    WHEN locked_until IS NOT NULL AND locked_until > $2 THEN login_failed_count
                    WHEN locked_until IS NOT NULL THEN 1
                    ELSE login_failed_count + 1
                END,
                last_failed_at = CASE
                    WHEN locked_until IS NOT NULL AND locked_until > $2 THEN last_failed_at
                    ELSE $2
                END,
                locked_until = CASE
                    WHEN locked_until IS NOT NULL AND locked_until > $2 THEN locked_until
                    WHEN locked_until IS NOT NULL THEN NULL
                    WHEN login_failed_count + 1 >= $3 THEN $4
                    ELSE NULL
                END,
                updated_at = CASE
                    WHEN locked_until IS NOT NULL AND locked_until > $2 THEN updated_at
                    ELSE $2
                END
            WHERE account_id = $1
            RETURNING {CREDENTIALS_COLUMNS}
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(now)
        .bind(max_attempts as i16)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AuthError::AccountNotFound)?.into_credentials()
    }

    async fn reset_login_failures(&self, account_id: &AccountId) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE account_credentials SET
                login_failed_count = 0,
                last_failed_at = NULL,
                locked_until = NULL,
                updated_at = $2
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Backup Code Repository Implementation
// ============================================================================

impl BackupCodeRepository for PgAuthRepository {
    async fn replace_all(
        &self,
        account_id: &AccountId,
        records: &[BackupCodeRecord],
    ) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (account_id, code_hash, used, used_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(account_id.as_uuid())
            .bind(&record.code_hash)
            .bind(record.used)
            .bind(record.used_at)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<BackupCodeRecord>> {
        let rows = sqlx::query_as::<_, BackupCodeRow>(
            r#"
            SELECT code_hash, used, used_at, created_at
            FROM backup_codes
            WHERE account_id = $1
            ORDER BY created_at, code_hash
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn consume(&self, account_id: &AccountId, code_hash: &str) -> AuthResult<bool> {
        // Conditional update is what makes the code single-use under
        // concurrency: exactly one of two racing requests flips the row.
        let affected = sqlx::query(
            r#"
            UPDATE backup_codes SET used = TRUE, used_at = $3
            WHERE account_id = $1 AND code_hash = $2 AND used = FALSE
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(code_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn count_unused(&self, account_id: &AccountId) -> AuthResult<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM backup_codes WHERE account_id = $1 AND used = FALSE",
        )
        .bind(account_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }
}

// ============================================================================
// Trusted Device Repository Implementation
// ============================================================================

impl TrustedDeviceRepository for PgAuthRepository {
    async fn insert_with_cap(&self, device: &TrustedDevice, cap: u32) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO trusted_devices (
                device_id, account_id, display_name, user_agent, created_at, last_used_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&device.device_id)
        .bind(device.account_id.as_uuid())
        .bind(&device.display_name)
        .bind(&device.user_agent)
        .bind(device.created_at)
        .bind(device.last_used_at)
        .execute(&mut *tx)
        .await?;

        // Evict the oldest grants beyond the cap
        sqlx::query(
            r#"
            DELETE FROM trusted_devices
            WHERE device_id IN (
                SELECT device_id FROM trusted_devices
                WHERE account_id = $1
                ORDER BY created_at DESC, device_id
                OFFSET $2
            )
            "#,
        )
        .bind(device.account_id.as_uuid())
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(
        &self,
        account_id: &AccountId,
        device_id: &str,
    ) -> AuthResult<Option<TrustedDevice>> {
        let row = sqlx::query_as::<_, TrustedDeviceRow>(
            r#"
            SELECT device_id, account_id, display_name, user_agent, created_at, last_used_at
            FROM trusted_devices
            WHERE account_id = $1 AND device_id = $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_device()))
    }

    async fn find_all(&self, account_id: &AccountId) -> AuthResult<Vec<TrustedDevice>> {
        let rows = sqlx::query_as::<_, TrustedDeviceRow>(
            r#"
            SELECT device_id, account_id, display_name, user_agent, created_at, last_used_at
            FROM trusted_devices
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_device()).collect())
    }

    async fn revoke(&self, account_id: &AccountId, device_id: &str) -> AuthResult<bool> {
        let affected =
            sqlx::query("DELETE FROM trusted_devices WHERE account_id = $1 AND device_id = $2")
                .bind(account_id.as_uuid())
                .bind(device_id)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(affected == 1)
    }

    async fn touch(&self, account_id: &AccountId, device_id: &str) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE trusted_devices SET last_used_at = $3
            WHERE account_id = $1 AND device_id = $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(device_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// OAuth Identity Repository Implementation
// ============================================================================

const OAUTH_IDENTITY_COLUMNS: &str = r#"
    id,
    account_id,
    provider,
    provider_id,
    email,
    name,
    avatar_url,
    profile_url,
    created_at,
    last_used_at
"#;

impl OAuthIdentityRepository for PgAuthRepository {
    async fn create(&self, identity: &OAuthIdentity) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_identities (
                id, account_id, provider, provider_id, email, name,
                avatar_url, profile_url, created_at, last_used_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.id)
        .bind(identity.account_id.as_uuid())
        .bind(identity.provider.code())
        .bind(&identity.provider_id)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.avatar_url)
        .bind(&identity.profile_url)
        .bind(identity.created_at)
        .bind(identity.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<OAuthIdentity>> {
        let row = sqlx::query_as::<_, OAuthIdentityRow>(&format!(
            r#"
            SELECT {OAUTH_IDENTITY_COLUMNS} FROM oauth_identities
            WHERE provider = $1 AND provider_id = $2
            "#
        ))
        .bind(provider.code())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_identity()).transpose()
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<OAuthIdentity>> {
        let rows = sqlx::query_as::<_, OAuthIdentityRow>(&format!(
            r#"
            SELECT {OAUTH_IDENTITY_COLUMNS} FROM oauth_identities
            WHERE account_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_identity()).collect()
    }

    async fn delete(&self, account_id: &AccountId, provider: OAuthProvider) -> AuthResult<bool> {
        let affected =
            sqlx::query("DELETE FROM oauth_identities WHERE account_id = $1 AND provider = $2")
                .bind(account_id.as_uuid())
                .bind(provider.code())
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(affected >= 1)
    }

    async fn update_snapshot(&self, identity: &OAuthIdentity) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE oauth_identities SET
                email = $2,
                name = $3,
                avatar_url = $4,
                profile_url = $5,
                last_used_at = $6
            WHERE id = $1
            "#,
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.avatar_url)
        .bind(&identity.profile_url)
        .bind(identity.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Login History Repository Implementation
// ============================================================================

impl LoginHistoryRepository for PgAuthRepository {
    async fn append_with_cap(&self, event: &LoginEvent, cap: u32) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO login_history (
                id, account_id, success, method, client_ip, user_agent, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.account_id.as_uuid())
        .bind(event.success)
        .bind(event.method.code())
        .bind(&event.client_ip)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM login_history
            WHERE id IN (
                SELECT id FROM login_history
                WHERE account_id = $1
                ORDER BY created_at DESC, id
                OFFSET $2
            )
            "#,
        )
        .bind(event.account_id.as_uuid())
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_recent(&self, account_id: &AccountId, limit: u32) -> AuthResult<Vec<LoginEvent>> {
        let rows = sqlx::query_as::<_, LoginEventRow>(
            r#"
            SELECT id, account_id, success, method, client_ip, user_agent, created_at
            FROM login_history
            WHERE account_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_event()).collect()
    }
}

// ============================================================================
// Two-Factor Throttle Repository Implementation
// ============================================================================

impl TwoFactorThrottleRepository for PgAuthRepository {
    async fn check_and_increment(
        &self,
        account_id: &AccountId,
        config: &RateLimitConfig,
    ) -> AuthResult<RateLimitResult> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = config.window_ms();

        // Fixed window anchored at the first attempt; an expired window
        // restarts transparently in the same upsert.
        let (attempts, window_start_ms) = sqlx::query_as::<_, (i32, i64)>(
            r#"
            INSERT INTO twofa_rate_limits (account_id, window_start_ms, attempts)
            VALUES ($1, $2, 1)
            ON CONFLICT (account_id) DO UPDATE SET
                attempts = CASE
                    WHEN twofa_rate_limits.window_start_ms + $3 <= $2 THEN 1
                    ELSE twofa_rate_limits.attempts + 1
                END,
                window_start_ms = CASE
                    WHEN twofa_rate_limits.window_start_ms + $3 <= $2 THEN $2
                    ELSE twofa_rate_limits.window_start_ms
                END
            RETURNING attempts, window_start_ms
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(now_ms)
        .bind(window_ms)
        .fetch_one(&self.pool)
        .await?;

        let allowed = attempts as u32 <= config.max_requests;
        Ok(RateLimitResult {
            allowed,
            remaining: config.max_requests.saturating_sub(attempts as u32),
            reset_at_ms: window_start_ms + window_ms,
        })
    }

    async fn reset(&self, account_id: &AccountId) -> AuthResult<()> {
        sqlx::query("DELETE FROM twofa_rate_limits WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Auth Session Repository Implementation
// ============================================================================

const SESSION_COLUMNS: &str = r#"
    session_id,
    account_id,
    public_id,
    account_role,
    expires_at_ms,
    remember_me,
    client_fingerprint_hash,
    client_ip,
    user_agent,
    created_at,
    last_activity_at
"#;

impl AuthSessionRepository for PgAuthRepository {
    async fn create(&self, session: &AuthSession) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (
                session_id,
                account_id,
                public_id,
                account_role,
                expires_at_ms,
                remember_me,
                client_fingerprint_hash,
                client_ip,
                user_agent,
                created_at,
                last_activity_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id)
        .bind(session.account_id.as_uuid())
        .bind(session.public_id.as_str())
        .bind(session.role.id())
        .bind(session.expires_at_ms)
        .bind(session.remember_me)
        .bind(&session.client_fingerprint_hash)
        .bind(&session.client_ip)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        session_id: Uuid,
        fingerprint_hash: &[u8],
    ) -> AuthResult<Option<AuthSession>> {
        let now_ms = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, AuthSessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM auth_sessions
            WHERE session_id = $1 AND expires_at_ms > $2
            "#
        ))
        .bind(session_id)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                // A valid token from the wrong client is worth logging
                if r.client_fingerprint_hash != fingerprint_hash {
                    tracing::warn!(
                        session_id = %session_id,
                        "Auth session fingerprint mismatch"
                    );
                    return Err(AuthError::SessionFingerprintMismatch);
                }
                Ok(Some(r.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<AuthSession>> {
        let now_ms = Utc::now().timestamp_millis();

        let rows = sqlx::query_as::<_, AuthSessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM auth_sessions
            WHERE account_id = $1 AND expires_at_ms > $2
            ORDER BY last_activity_at DESC
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_session()).collect()
    }

    async fn update(&self, session: &AuthSession) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_sessions SET
                expires_at_ms = $2,
                last_activity_at = $3
            WHERE session_id = $1
            "#,
        )
        .bind(session.session_id)
        .bind(session.expires_at_ms)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_all_for_account(
        &self,
        account_id: &AccountId,
        except: Option<Uuid>,
    ) -> AuthResult<u64> {
        let deleted = match except {
            Some(except_id) => {
                sqlx::query("DELETE FROM auth_sessions WHERE account_id = $1 AND session_id != $2")
                    .bind(account_id.as_uuid())
                    .bind(except_id)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            None => {
                sqlx::query("DELETE FROM auth_sessions WHERE account_id = $1")
                    .bind(account_id.as_uuid())
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
        };

        Ok(deleted)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.cleanup_expired().await
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

fn account_select(where_clause: &str) -> String {
    format!(
        r#"
        SELECT
            account_id,
            public_id,
            email,
            display_name,
            avatar_url,
            account_role,
            account_status,
            last_login_at,
            created_at,
            updated_at
        FROM accounts
        WHERE {where_clause}
        "#
    )
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_id: Uuid,
    public_id: String,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
    account_role: i16,
    account_status: i16,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> AuthResult<Account> {
        let public_id = PublicId::parse_str(&self.public_id)
            .map_err(|e| AuthError::Internal(format!("Invalid public_id: {}", e)))?;

        Ok(Account {
            account_id: AccountId::from_uuid(self.account_id),
            public_id,
            email: Email::from_db(self.email),
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            role: AccountRole::from_id(self.account_role),
            status: AccountStatus::from_id(self.account_status).unwrap_or_default(),
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    account_id: Uuid,
    password_hash: Option<String>,
    totp_secret: Option<String>,
    two_factor_enabled: bool,
    login_failed_count: i16,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    require_two_factor: bool,
    trusted_devices_enabled: bool,
    session_timeout_secs: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialsRow {
    fn into_credentials(self) -> AuthResult<Credentials> {
        let password_hash = self
            .password_hash
            .map(PasswordHash::from_phc_string)
            .transpose()
            .map_err(|e| AuthError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Credentials {
            account_id: AccountId::from_uuid(self.account_id),
            password_hash,
            totp_secret: self.totp_secret.map(TotpSecret::from_encrypted),
            two_factor_enabled: self.two_factor_enabled,
            login_failed_count: self.login_failed_count as u16,
            last_failed_at: self.last_failed_at,
            locked_until: self.locked_until,
            require_two_factor: self.require_two_factor,
            trusted_devices_enabled: self.trusted_devices_enabled,
            session_timeout_secs: self.session_timeout_secs,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BackupCodeRow {
    code_hash: String,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl BackupCodeRow {
    fn into_record(self) -> BackupCodeRecord {
        BackupCodeRecord {
            code_hash: self.code_hash,
            used: self.used,
            used_at: self.used_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TrustedDeviceRow {
    device_id: String,
    account_id: Uuid,
    display_name: String,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
}

impl TrustedDeviceRow {
    fn into_device(self) -> TrustedDevice {
        TrustedDevice {
            device_id: self.device_id,
            account_id: AccountId::from_uuid(self.account_id),
            display_name: self.display_name,
            user_agent: self.user_agent,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OAuthIdentityRow {
    id: Uuid,
    account_id: Uuid,
    provider: String,
    provider_id: String,
    email: String,
    name: Option<String>,
    avatar_url: Option<String>,
    profile_url: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
}

impl OAuthIdentityRow {
    fn into_identity(self) -> AuthResult<OAuthIdentity> {
        let provider = OAuthProvider::from_code(&self.provider)
            .ok_or_else(|| AuthError::Internal(format!("Unknown provider: {}", self.provider)))?;

        Ok(OAuthIdentity {
            id: self.id,
            account_id: AccountId::from_uuid(self.account_id),
            provider,
            provider_id: self.provider_id,
            email: self.email,
            name: self.name,
            avatar_url: self.avatar_url,
            profile_url: self.profile_url,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LoginEventRow {
    id: Uuid,
    account_id: Uuid,
    success: bool,
    method: String,
    client_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl LoginEventRow {
    fn into_event(self) -> AuthResult<LoginEvent> {
        let method = LoginMethod::from_code(&self.method)
            .ok_or_else(|| AuthError::Internal(format!("Unknown login method: {}", self.method)))?;

        Ok(LoginEvent {
            id: self.id,
            account_id: AccountId::from_uuid(self.account_id),
            success: self.success,
            method,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuthSessionRow {
    session_id: Uuid,
    account_id: Uuid,
    public_id: String,
    account_role: i16,
    expires_at_ms: i64,
    remember_me: bool,
    client_fingerprint_hash: Vec<u8>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl AuthSessionRow {
    fn into_session(self) -> AuthResult<AuthSession> {
        let public_id = PublicId::parse_str(&self.public_id)
            .map_err(|e| AuthError::Internal(format!("Invalid public_id: {}", e)))?;

        Ok(AuthSession {
            session_id: self.session_id,
            account_id: AccountId::from_uuid(self.account_id),
            public_id,
            role: AccountRole::from_id(self.account_role),
            expires_at_ms: self.expires_at_ms,
            remember_me: self.remember_me,
            client_fingerprint_hash: self.client_fingerprint_hash,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        })
    }
}
