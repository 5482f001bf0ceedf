//! TOTP Setup Use Case
//!
//! Lifecycle of the TOTP second factor for a signed-in account:
//! provisioning (secret + QR), confirmation (first valid code enables 2FA
//! and mints backup codes), backup-code regeneration, and disabling.
//!
//! The plaintext secret and the backup codes cross the API exactly once,
//! at the moment they are generated.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::domain::entity::credentials::Credentials;
use crate::domain::repository::{AccountRepository, BackupCodeRepository, CredentialsRepository};
use crate::domain::value_object::account_id::AccountId;
use crate::domain::value_object::backup_code::{self, DEFAULT_BATCH_SIZE};
use crate::domain::value_object::totp_secret::TotpSecret;
use crate::error::{AuthError, AuthResult};

/// TOTP provisioning output
pub struct TotpSetupOutput {
    /// Base32 secret for manual entry (display once)
    pub secret_base32: String,
    /// otpauth:// URL for authenticator apps
    pub otpauth_url: String,
    /// QR code as base64-encoded PNG
    pub qr_code_base64: String,
}

/// Current 2FA state for the settings page
pub struct TwoFactorStatus {
    /// 2FA is enabled and enforced at sign-in
    pub enabled: bool,
    /// A secret has been provisioned but not yet confirmed
    pub pending: bool,
    /// Unused backup codes left
    pub backup_codes_remaining: u32,
}

/// TOTP setup use case
pub struct TotpSetupUseCase<A, C, B>
where
    A: AccountRepository,
    C: CredentialsRepository,
    B: BackupCodeRepository,
{
    account_repo: Arc<A>,
    credentials_repo: Arc<C>,
    backup_repo: Arc<B>,
    config: Arc<AuthConfig>,
}

impl<A, C, B> TotpSetupUseCase<A, C, B>
where
    A: AccountRepository,
    C: CredentialsRepository,
    B: BackupCodeRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        credentials_repo: Arc<C>,
        backup_repo: Arc<B>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            account_repo,
            credentials_repo,
            backup_repo,
            config,
        }
    }

    /// Provision a fresh secret; 2FA stays off until [`confirm`] succeeds
    ///
    /// Re-running setup replaces a pending (unconfirmed) secret. An
    /// already-enabled account must disable first.
    ///
    /// [`confirm`]: Self::confirm
    pub async fn setup(&self, account_id: &AccountId) -> AuthResult<TotpSetupOutput> {
        let (mut credentials, label) = self.load(account_id).await?;

        if credentials.two_factor_enabled {
            return Err(AuthError::Validation(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        let cipher = self.config.cipher();
        let (secret, secret_base32) = TotpSecret::generate(&cipher)?;

        let otpauth_url = secret.otpauth_url(&cipher, &self.config.totp_issuer, &label)?;
        let qr_code_base64 = secret.qr_code_base64(&cipher, &self.config.totp_issuer, &label)?;

        credentials.set_totp_secret(secret);
        self.credentials_repo.update(&credentials).await?;

        tracing::info!(account_id = %account_id, "TOTP secret provisioned");

        Ok(TotpSetupOutput {
            secret_base32,
            otpauth_url,
            qr_code_base64,
        })
    }

    /// Confirm the pending secret with a first valid code
    ///
    /// Enables 2FA and returns the freshly minted backup codes.
    pub async fn confirm(&self, account_id: &AccountId, code: &str) -> AuthResult<Vec<String>> {
        let (mut credentials, label) = self.load(account_id).await?;

        if credentials.two_factor_enabled {
            return Err(AuthError::Validation(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        self.check_totp(&credentials, code, &label).await?;

        credentials.enable_totp();
        self.credentials_repo.update(&credentials).await?;

        let batch = backup_code::generate_batch(&self.config.cipher(), DEFAULT_BATCH_SIZE);
        self.backup_repo
            .replace_all(account_id, &batch.records)
            .await?;

        tracing::info!(account_id = %account_id, "Two-factor authentication enabled");

        Ok(batch.plaintext_codes)
    }

    /// Disable 2FA, dropping the secret and all backup codes
    ///
    /// Requires a current valid TOTP code so a hijacked session cannot
    /// silently weaken the account.
    pub async fn disable(&self, account_id: &AccountId, code: &str) -> AuthResult<()> {
        let (mut credentials, label) = self.load(account_id).await?;

        if !credentials.requires_two_factor() {
            return Err(AuthError::TwoFactorNotSetup);
        }

        self.check_totp(&credentials, code, &label).await?;

        credentials.disable_totp();
        self.credentials_repo.update(&credentials).await?;
        self.backup_repo.replace_all(account_id, &[]).await?;

        tracing::info!(account_id = %account_id, "Two-factor authentication disabled");

        Ok(())
    }

    /// Replace the whole backup-code batch
    ///
    /// Old codes stop working immediately, spent or not.
    pub async fn regenerate_backup_codes(
        &self,
        account_id: &AccountId,
        code: &str,
    ) -> AuthResult<Vec<String>> {
        let (credentials, label) = self.load(account_id).await?;

        if !credentials.requires_two_factor() {
            return Err(AuthError::TwoFactorNotSetup);
        }

        self.check_totp(&credentials, code, &label).await?;

        let batch = backup_code::generate_batch(&self.config.cipher(), DEFAULT_BATCH_SIZE);
        self.backup_repo
            .replace_all(account_id, &batch.records)
            .await?;

        tracing::info!(account_id = %account_id, "Backup codes regenerated");

        Ok(batch.plaintext_codes)
    }

    /// Current 2FA state for display
    pub async fn status(&self, account_id: &AccountId) -> AuthResult<TwoFactorStatus> {
        let credentials = self
            .credentials_repo
            .find_by_account_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let backup_codes_remaining = if credentials.two_factor_enabled {
            self.backup_repo.count_unused(account_id).await?
        } else {
            0
        };

        Ok(TwoFactorStatus {
            enabled: credentials.two_factor_enabled,
            pending: !credentials.two_factor_enabled && credentials.totp_secret.is_some(),
            backup_codes_remaining,
        })
    }

    async fn load(&self, account_id: &AccountId) -> AuthResult<(Credentials, String)> {
        let account = self
            .account_repo
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let credentials = self
            .credentials_repo
            .find_by_account_id(account_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credentials not found".to_string()))?;

        Ok((credentials, account.email.as_str().to_string()))
    }

    async fn check_totp(
        &self,
        credentials: &Credentials,
        code: &str,
        label: &str,
    ) -> AuthResult<()> {
        let secret = credentials
            .totp_secret
            .as_ref()
            .ok_or(AuthError::TwoFactorNotSetup)?;

        let valid = secret.verify(
            code.trim(),
            &self.config.cipher(),
            &self.config.totp_issuer,
            label,
        )?;

        if !valid {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        Ok(())
    }
}
