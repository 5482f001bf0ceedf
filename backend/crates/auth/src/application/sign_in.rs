//! Sign In Use Case
//!
//! First factor of authentication: email and password. Ends in one of
//! three ways: a session (no 2FA, or a trusted device), a short-lived
//! challenge reference (2FA still required), or a rejection.
//!
//! Rejections are deliberately uniform: unknown email, wrong password and
//! a missing password hash (OAuth-only account) all surface as the same
//! generic error.

use std::sync::Arc;

use platform::client::ClientFingerprint;

use crate::application::config::AuthConfig;
use crate::application::session::{self, IssuedSession};
use crate::application::token;
use crate::domain::entity::account::Account;
use crate::domain::entity::credentials::Credentials;
use crate::domain::entity::login_event::LoginMethod;
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, CredentialsRepository, LoginHistoryRepository,
    TrustedDeviceRepository,
};
use crate::domain::value_object::{email::Email, password::RawPassword};
use crate::error::{AuthError, AuthResult};

/// Sign in input
pub struct SignInInput {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    /// Opaque device token from the trusted-device cookie, if any
    pub trusted_device_id: Option<String>,
}

/// Sign in outcome
pub enum SignInOutcome {
    /// Fully authenticated; session issued
    SignedIn(IssuedSession),
    /// Password accepted but a second factor is still required
    ChallengeRequired {
        /// Opaque signed reference for the verify endpoint
        challenge: String,
    },
}

/// Sign in use case
pub struct SignInUseCase<A, C, D, H, S>
where
    A: AccountRepository,
    C: CredentialsRepository,
    D: TrustedDeviceRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
{
    account_repo: Arc<A>,
    credentials_repo: Arc<C>,
    device_repo: Arc<D>,
    history_repo: Arc<H>,
    session_repo: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<A, C, D, H, S> SignInUseCase<A, C, D, H, S>
where
    A: AccountRepository,
    C: CredentialsRepository,
    D: TrustedDeviceRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        credentials_repo: Arc<C>,
        device_repo: Arc<D>,
        history_repo: Arc<H>,
        session_repo: Arc<S>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            account_repo,
            credentials_repo,
            device_repo,
            history_repo,
            session_repo,
            config,
        }
    }

    pub async fn execute(
        &self,
        input: SignInInput,
        fingerprint: ClientFingerprint,
    ) -> AuthResult<SignInOutcome> {
        let email = Email::new(&input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let account = self
            .account_repo
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let credentials = self
            .credentials_repo
            .find_by_account_id(&account.account_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credentials not found".to_string()))?;

        // Locked accounts are rejected before any password work, so a
        // guesser gains nothing (and cannot extend the lock) while it holds.
        let now = chrono::Utc::now();
        if credentials.is_locked_at(now) {
            session::record_login_event(
                &self.history_repo,
                &self.config,
                account.account_id,
                false,
                LoginMethod::Password,
                &fingerprint,
            )
            .await;

            return Err(AuthError::AccountLocked {
                retry_after_secs: credentials.lock_remaining_secs_at(now),
            });
        }

        // An unparseable password, a wrong password and an absent hash
        // (OAuth-only account) all fail identically.
        let password_valid = match RawPassword::new(input.password) {
            Ok(raw) => match &credentials.password_hash {
                Some(hash) => hash.verify(&raw, self.config.pepper()),
                None => false,
            },
            Err(_) => false,
        };

        if !password_valid {
            let updated = self
                .credentials_repo
                .record_login_failure(
                    &account.account_id,
                    self.config.max_login_attempts,
                    self.config.lockout_chrono(),
                )
                .await?;

            if updated.is_locked() {
                tracing::warn!(
                    public_id = %account.public_id,
                    "Account locked after repeated sign-in failures"
                );
            }

            session::record_login_event(
                &self.history_repo,
                &self.config,
                account.account_id,
                false,
                LoginMethod::Password,
                &fingerprint,
            )
            .await;

            return Err(AuthError::InvalidCredentials);
        }

        self.credentials_repo
            .reset_login_failures(&account.account_id)
            .await?;

        // Second factor, unless a live trusted device vouches for the client
        if credentials.requires_two_factor()
            && !self
                .trusted_device_skips(&credentials, input.trusted_device_id.as_deref())
                .await?
        {
            let challenge = token::issue_challenge(
                &self.config.session_secret,
                &account.account_id,
                input.remember_me,
            );

            tracing::info!(
                public_id = %account.public_id,
                "Password accepted, second factor pending"
            );

            return Ok(SignInOutcome::ChallengeRequired { challenge });
        }

        self.finalize(
            account,
            input.remember_me,
            credentials.session_ttl_override(),
            &fingerprint,
        )
        .await
    }

    /// Whether a presented device token lets this sign-in skip 2FA
    async fn trusted_device_skips(
        &self,
        credentials: &Credentials,
        device_id: Option<&str>,
    ) -> AuthResult<bool> {
        let Some(device_id) = device_id else {
            return Ok(false);
        };

        if !credentials.trusted_device_may_skip() {
            return Ok(false);
        }

        let Some(device) = self
            .device_repo
            .find(&credentials.account_id, device_id)
            .await?
        else {
            return Ok(false);
        };

        if device.is_expired(self.config.trusted_device_ttl_chrono()) {
            return Ok(false);
        }

        self.device_repo
            .touch(&credentials.account_id, device_id)
            .await?;

        Ok(true)
    }

    async fn finalize(
        &self,
        mut account: Account,
        remember_me: bool,
        ttl_override: Option<chrono::Duration>,
        fingerprint: &ClientFingerprint,
    ) -> AuthResult<SignInOutcome> {
        account.record_login();
        self.account_repo.update(&account).await?;

        let issued = session::issue_session(
            &self.session_repo,
            &self.config,
            &account,
            remember_me,
            ttl_override,
            fingerprint,
        )
        .await?;

        session::record_login_event(
            &self.history_repo,
            &self.config,
            account.account_id,
            true,
            LoginMethod::Password,
            fingerprint,
        )
        .await;

        tracing::info!(
            public_id = %account.public_id,
            remember_me,
            "Account signed in"
        );

        Ok(SignInOutcome::SignedIn(issued))
    }
}
