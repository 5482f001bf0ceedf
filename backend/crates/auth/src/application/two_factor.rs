//! Two-Factor Verification Use Case
//!
//! Second step of a 2FA sign-in: exchanges the challenge reference from
//! the password step plus a verification code for a session. Accepts a
//! 6-digit TOTP code or an 8-digit backup code; the code's shape selects
//! the method, and the error for a wrong code never says which was tried.
//!
//! Attempts are throttled per account, independently of the password
//! lockout counter.

use std::sync::Arc;

use chrono::Utc;
use platform::client::ClientFingerprint;

use crate::application::config::AuthConfig;
use crate::application::session::{self, IssuedSession};
use crate::application::token;
use crate::domain::entity::credentials::Credentials;
use crate::domain::entity::login_event::LoginMethod;
use crate::domain::entity::trusted_device::TrustedDevice;
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, BackupCodeRepository, CredentialsRepository,
    LoginHistoryRepository, TrustedDeviceRepository, TwoFactorThrottleRepository,
};
use crate::domain::value_object::backup_code;
use crate::error::{AuthError, AuthResult};

/// Two-factor verification input
pub struct TwoFactorInput {
    /// Challenge reference returned by sign-in
    pub challenge: String,
    /// TOTP code (6 digits) or backup code (8 digits)
    pub code: String,
    /// Remember this device and skip 2FA on it next time
    pub trust_device: bool,
}

/// Two-factor verification output
pub struct TwoFactorOutput {
    pub session: IssuedSession,
    /// Opaque device token for the trust cookie, when requested
    pub trusted_device_id: Option<String>,
    /// Unused backup codes left, reported after one was spent
    pub backup_codes_remaining: Option<u32>,
}

/// Two-factor verification use case
pub struct VerifyTwoFactorUseCase<A, C, B, D, T, H, S>
where
    A: AccountRepository,
    C: CredentialsRepository,
    B: BackupCodeRepository,
    D: TrustedDeviceRepository,
    T: TwoFactorThrottleRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
{
    account_repo: Arc<A>,
    credentials_repo: Arc<C>,
    backup_repo: Arc<B>,
    device_repo: Arc<D>,
    throttle_repo: Arc<T>,
    history_repo: Arc<H>,
    session_repo: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<A, C, B, D, T, H, S> VerifyTwoFactorUseCase<A, C, B, D, T, H, S>
where
    A: AccountRepository,
    C: CredentialsRepository,
    B: BackupCodeRepository,
    D: TrustedDeviceRepository,
    T: TwoFactorThrottleRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_repo: Arc<A>,
        credentials_repo: Arc<C>,
        backup_repo: Arc<B>,
        device_repo: Arc<D>,
        throttle_repo: Arc<T>,
        history_repo: Arc<H>,
        session_repo: Arc<S>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            account_repo,
            credentials_repo,
            backup_repo,
            device_repo,
            throttle_repo,
            history_repo,
            session_repo,
            config,
        }
    }

    pub async fn execute(
        &self,
        input: TwoFactorInput,
        fingerprint: ClientFingerprint,
    ) -> AuthResult<TwoFactorOutput> {
        let challenge = token::parse_challenge(
            &self.config.session_secret,
            &input.challenge,
            self.config.challenge_ttl.as_millis() as i64,
        )?;

        let mut account = self
            .account_repo
            .find_by_id(&challenge.account_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        if !account.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let credentials = self
            .credentials_repo
            .find_by_account_id(&account.account_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credentials not found".to_string()))?;

        if !credentials.requires_two_factor() {
            return Err(AuthError::TwoFactorNotSetup);
        }

        // Throttle before touching any secret. The window is per account,
        // so a guesser cannot reset it by re-running the password step.
        let throttle = self
            .throttle_repo
            .check_and_increment(&account.account_id, &self.config.twofa_throttle)
            .await?;
        if !throttle.allowed {
            return Err(AuthError::TooManyTwoFactorAttempts {
                retry_after_secs: throttle.retry_after_secs(Utc::now().timestamp_millis()),
            });
        }

        let account_label = account.email.as_str().to_string();
        let (method, backup_codes_remaining) =
            match self
                .verify_code(&credentials, input.code.trim(), &account_label)
                .await?
            {
                Some(result) => result,
                None => {
                    session::record_login_event(
                        &self.history_repo,
                        &self.config,
                        account.account_id,
                        false,
                        LoginMethod::Totp,
                        &fingerprint,
                    )
                    .await;
                    return Err(AuthError::InvalidTwoFactorCode);
                }
            };

        self.throttle_repo.reset(&account.account_id).await?;

        let trusted_device_id = if input.trust_device && credentials.trusted_devices_enabled {
            let device = TrustedDevice::new(
                account.account_id,
                fingerprint.display_name(),
                fingerprint.user_agent.clone(),
            );
            self.device_repo
                .insert_with_cap(&device, self.config.trusted_device_cap)
                .await?;
            Some(device.device_id)
        } else {
            None
        };

        account.record_login();
        self.account_repo.update(&account).await?;

        let issued = session::issue_session(
            &self.session_repo,
            &self.config,
            &account,
            challenge.remember_me,
            credentials.session_ttl_override(),
            &fingerprint,
        )
        .await?;

        session::record_login_event(
            &self.history_repo,
            &self.config,
            account.account_id,
            true,
            method,
            &fingerprint,
        )
        .await;

        tracing::info!(
            public_id = %account.public_id,
            method = %method.code(),
            trusted_device = trusted_device_id.is_some(),
            "Second factor verified"
        );

        Ok(TwoFactorOutput {
            session: issued,
            trusted_device_id,
            backup_codes_remaining,
        })
    }

    /// Check the code against TOTP or the backup codes by shape
    ///
    /// Returns the method used on success, `None` for a wrong code.
    /// Backup-code consumption goes through the store's conditional
    /// update, so a code presented twice concurrently is spent once.
    async fn verify_code(
        &self,
        credentials: &Credentials,
        code: &str,
        account_label: &str,
    ) -> AuthResult<Option<(LoginMethod, Option<u32>)>> {
        if code.len() == 6 {
            let secret = credentials
                .totp_secret
                .as_ref()
                .ok_or(AuthError::TwoFactorNotSetup)?;

            let cipher = self.config.cipher();
            let valid = secret.verify(code, &cipher, &self.config.totp_issuer, account_label)?;

            return Ok(valid.then_some((LoginMethod::Totp, None)));
        }

        let cipher = self.config.cipher();
        let records = self
            .backup_repo
            .find_by_account_id(&credentials.account_id)
            .await?;

        let Some(index) = backup_code::locate(code, &cipher, &records) else {
            return Ok(None);
        };

        let consumed = self
            .backup_repo
            .consume(&credentials.account_id, &records[index].code_hash)
            .await?;
        if !consumed {
            // Lost the race against a parallel request using the same code
            return Ok(None);
        }

        let remaining = self
            .backup_repo
            .count_unused(&credentials.account_id)
            .await?;

        Ok(Some((LoginMethod::BackupCode, Some(remaining))))
    }
}
