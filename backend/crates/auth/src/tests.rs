//! Use-case scenario tests against in-memory repositories
//!
//! The fakes implement the repository ports with the same observable
//! contracts as the PostgreSQL implementation (conditional backup-code
//! consumption, lockout transitions, fixed-window throttling) so the
//! orchestration logic can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use platform::client::ClientFingerprint;
use platform::rate_limit::{RateLimitConfig, RateLimitResult};

use crate::application::config::{AuthConfig, OAuthProviderConfig};
use crate::application::oauth::{OAuthGateway, OAuthTokens};
use crate::application::{
    CheckSessionUseCase, OAuthCallbackOutcome, OAuthUseCase, SignInInput, SignInOutcome,
    SignInUseCase, SignOutUseCase, SignUpInput, SignUpUseCase, TotpSetupUseCase, TwoFactorInput,
    VerifyTwoFactorUseCase,
};
use crate::domain::entity::account::Account;
use crate::domain::entity::auth_session::AuthSession;
use crate::domain::entity::credentials::Credentials;
use crate::domain::entity::login_event::LoginEvent;
use crate::domain::entity::oauth_identity::OAuthIdentity;
use crate::domain::entity::trusted_device::TrustedDevice;
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, BackupCodeRepository, CredentialsRepository,
    LoginHistoryRepository, OAuthIdentityRepository, TrustedDeviceRepository,
    TwoFactorThrottleRepository,
};
use crate::domain::value_object::{
    account_id::AccountId,
    backup_code::BackupCodeRecord,
    email::Email,
    oauth_provider::{NormalizedProfile, OAuthProvider},
    public_id::PublicId,
};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// In-memory repository
// ============================================================================

#[derive(Default)]
struct MemState {
    accounts: Vec<Account>,
    credentials: Vec<Credentials>,
    backup_codes: HashMap<AccountId, Vec<BackupCodeRecord>>,
    devices: Vec<TrustedDevice>,
    identities: Vec<OAuthIdentity>,
    history: HashMap<AccountId, Vec<LoginEvent>>,
    throttle: HashMap<AccountId, (i64, u32)>,
    sessions: Vec<AuthSession>,
}

#[derive(Clone, Default)]
struct MemRepo {
    state: Arc<Mutex<MemState>>,
}

impl MemRepo {
    fn new() -> Self {
        Self::default()
    }

    fn credentials_of(&self, account_id: &AccountId) -> Credentials {
        let state = self.state.lock().unwrap();
        state
            .credentials
            .iter()
            .find(|c| c.account_id == *account_id)
            .cloned()
            .expect("credentials present")
    }
}

impl AccountRepository for MemRepo {
    async fn create(&self, account: &Account) -> AuthResult<()> {
        self.state.lock().unwrap().accounts.push(account.clone());
        Ok(())
    }

    async fn find_by_id(&self, account_id: &AccountId) -> AuthResult<Option<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .find(|a| a.account_id == *account_id)
            .cloned())
    }

    async fn find_by_public_id(&self, public_id: &PublicId) -> AuthResult<Option<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .find(|a| a.public_id == *public_id)
            .cloned())
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.iter().find(|a| a.email == *email).cloned())
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.iter().any(|a| a.email == *email))
    }

    async fn update(&self, account: &Account) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account.account_id)
        {
            *slot = account.clone();
        }
        Ok(())
    }
}

impl CredentialsRepository for MemRepo {
    async fn create(&self, credentials: &Credentials) -> AuthResult<()> {
        self.state
            .lock()
            .unwrap()
            .credentials
            .push(credentials.clone());
        Ok(())
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Option<Credentials>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .credentials
            .iter()
            .find(|c| c.account_id == *account_id)
            .cloned())
    }

    async fn update(&self, credentials: &Credentials) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state
            .credentials
            .iter_mut()
            .find(|c| c.account_id == credentials.account_id)
        {
            *slot = credentials.clone();
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        account_id: &AccountId,
        max_attempts: u16,
        lockout: Duration,
    ) -> AuthResult<Credentials> {
        let mut state = self.state.lock().unwrap();
        let credentials = state
            .credentials
            .iter_mut()
            .find(|c| c.account_id == *account_id)
            .ok_or(AuthError::AccountNotFound)?;

        credentials.record_failure_at(Utc::now(), max_attempts, lockout);
        Ok(credentials.clone())
    }

    async fn reset_login_failures(&self, account_id: &AccountId) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(credentials) = state
            .credentials
            .iter_mut()
            .find(|c| c.account_id == *account_id)
        {
            credentials.reset_failures_at(Utc::now());
        }
        Ok(())
    }
}

impl BackupCodeRepository for MemRepo {
    async fn replace_all(
        &self,
        account_id: &AccountId,
        records: &[BackupCodeRecord],
    ) -> AuthResult<()> {
        self.state
            .lock()
            .unwrap()
            .backup_codes
            .insert(*account_id, records.to_vec());
        Ok(())
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<BackupCodeRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.backup_codes.get(account_id).cloned().unwrap_or_default())
    }

    async fn consume(&self, account_id: &AccountId, code_hash: &str) -> AuthResult<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(records) = state.backup_codes.get_mut(account_id) else {
            return Ok(false);
        };

        match records.iter_mut().find(|r| r.code_hash == code_hash && !r.used) {
            Some(record) => {
                record.used = true;
                record.used_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unused(&self, account_id: &AccountId) -> AuthResult<u32> {
        let state = self.state.lock().unwrap();
        Ok(state
            .backup_codes
            .get(account_id)
            .map(|records| records.iter().filter(|r| !r.used).count() as u32)
            .unwrap_or(0))
    }
}

impl TrustedDeviceRepository for MemRepo {
    async fn insert_with_cap(&self, device: &TrustedDevice, cap: u32) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        state.devices.push(device.clone());

        let mut owned: Vec<usize> = state
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.account_id == device.account_id)
            .map(|(i, _)| i)
            .collect();
        owned.sort_by_key(|&i| std::cmp::Reverse(state.devices[i].created_at));

        let keep = (cap as usize).min(owned.len());
        let mut evict: Vec<usize> = owned.split_off(keep);
        evict.sort_unstable_by(|a, b| b.cmp(a));
        for index in evict {
            state.devices.remove(index);
        }
        Ok(())
    }

    async fn find(
        &self,
        account_id: &AccountId,
        device_id: &str,
    ) -> AuthResult<Option<TrustedDevice>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .devices
            .iter()
            .find(|d| d.account_id == *account_id && d.device_id == device_id)
            .cloned())
    }

    async fn find_all(&self, account_id: &AccountId) -> AuthResult<Vec<TrustedDevice>> {
        let state = self.state.lock().unwrap();
        let mut devices: Vec<TrustedDevice> = state
            .devices
            .iter()
            .filter(|d| d.account_id == *account_id)
            .cloned()
            .collect();
        devices.sort_by_key(|d| std::cmp::Reverse(d.created_at));
        Ok(devices)
    }

    async fn revoke(&self, account_id: &AccountId, device_id: &str) -> AuthResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.devices.len();
        state
            .devices
            .retain(|d| !(d.account_id == *account_id && d.device_id == device_id));
        Ok(state.devices.len() < before)
    }

    async fn touch(&self, account_id: &AccountId, device_id: &str) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state
            .devices
            .iter_mut()
            .find(|d| d.account_id == *account_id && d.device_id == device_id)
        {
            device.touch();
        }
        Ok(())
    }
}

impl OAuthIdentityRepository for MemRepo {
    async fn create(&self, identity: &OAuthIdentity) -> AuthResult<()> {
        self.state.lock().unwrap().identities.push(identity.clone());
        Ok(())
    }

    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> AuthResult<Option<OAuthIdentity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .identities
            .iter()
            .find(|i| i.provider == provider && i.provider_id == provider_id)
            .cloned())
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<OAuthIdentity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .identities
            .iter()
            .filter(|i| i.account_id == *account_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, account_id: &AccountId, provider: OAuthProvider) -> AuthResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.identities.len();
        state
            .identities
            .retain(|i| !(i.account_id == *account_id && i.provider == provider));
        Ok(state.identities.len() < before)
    }

    async fn update_snapshot(&self, identity: &OAuthIdentity) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.identities.iter_mut().find(|i| i.id == identity.id) {
            *slot = identity.clone();
        }
        Ok(())
    }
}

impl LoginHistoryRepository for MemRepo {
    async fn append_with_cap(&self, event: &LoginEvent, cap: u32) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        let events = state.history.entry(event.account_id).or_default();
        events.push(event.clone());

        let overflow = events.len().saturating_sub(cap as usize);
        if overflow > 0 {
            events.drain(..overflow);
        }
        Ok(())
    }

    async fn find_recent(&self, account_id: &AccountId, limit: u32) -> AuthResult<Vec<LoginEvent>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .get(account_id)
            .map(|events| {
                events
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl TwoFactorThrottleRepository for MemRepo {
    async fn check_and_increment(
        &self,
        account_id: &AccountId,
        config: &RateLimitConfig,
    ) -> AuthResult<RateLimitResult> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = config.window_ms();

        let mut state = self.state.lock().unwrap();
        let entry = state.throttle.entry(*account_id).or_insert((now_ms, 0));

        if entry.0 + window_ms <= now_ms {
            *entry = (now_ms, 0);
        }
        entry.1 += 1;

        Ok(RateLimitResult {
            allowed: entry.1 <= config.max_requests,
            remaining: config.max_requests.saturating_sub(entry.1),
            reset_at_ms: entry.0 + window_ms,
        })
    }

    async fn reset(&self, account_id: &AccountId) -> AuthResult<()> {
        self.state.lock().unwrap().throttle.remove(account_id);
        Ok(())
    }
}

impl AuthSessionRepository for MemRepo {
    async fn create(&self, session: &AuthSession) -> AuthResult<()> {
        self.state.lock().unwrap().sessions.push(session.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        session_id: Uuid,
        fingerprint_hash: &[u8],
    ) -> AuthResult<Option<AuthSession>> {
        let state = self.state.lock().unwrap();
        match state.sessions.iter().find(|s| s.session_id == session_id) {
            Some(session) if session.client_fingerprint_hash == fingerprint_hash => {
                Ok(Some(session.clone()))
            }
            Some(_) => Err(AuthError::SessionFingerprintMismatch),
            None => Ok(None),
        }
    }

    async fn find_by_account_id(&self, account_id: &AccountId) -> AuthResult<Vec<AuthSession>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.account_id == *account_id)
            .cloned()
            .collect())
    }

    async fn update(&self, session: &AuthSession) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session.session_id)
        {
            *slot = session.clone();
        }
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> AuthResult<()> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .retain(|s| s.session_id != session_id);
        Ok(())
    }

    async fn delete_all_for_account(
        &self,
        account_id: &AccountId,
        except: Option<Uuid>,
    ) -> AuthResult<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.sessions.len();
        state
            .sessions
            .retain(|s| s.account_id != *account_id || Some(s.session_id) == except);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut state = self.state.lock().unwrap();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.expires_at_ms >= now_ms);
        Ok((before - state.sessions.len()) as u64)
    }
}

// ============================================================================
// Fake OAuth gateway
// ============================================================================

#[derive(Clone)]
struct FakeGateway {
    profile: NormalizedProfile,
}

impl FakeGateway {
    fn returning(profile: NormalizedProfile) -> Self {
        Self { profile }
    }
}

impl OAuthGateway for FakeGateway {
    async fn exchange_code(
        &self,
        _provider: OAuthProvider,
        _provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens> {
        Ok(OAuthTokens {
            access_token: format!("access-{code}"),
            email: None,
        })
    }

    async fn fetch_profile(
        &self,
        _provider: OAuthProvider,
        _tokens: &OAuthTokens,
    ) -> AuthResult<NormalizedProfile> {
        Ok(self.profile.clone())
    }
}

// ============================================================================
// Scenario helpers
// ============================================================================

const EMAIL: &str = "traveler@example.com";
const PASSWORD: &str = "Gl4cier!Basecamp";

fn test_config() -> AuthConfig {
    let mut config = AuthConfig::with_random_secret();
    config.google = Some(OAuthProviderConfig {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uri: "https://app.example.com/oauth/callback".to_string(),
        scopes: vec!["openid".to_string(), "email".to_string()],
    });
    config
}

fn fingerprint() -> ClientFingerprint {
    ClientFingerprint::new(
        [1u8; 32],
        Some("203.0.113.7".parse().unwrap()),
        Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/115.0".to_string()),
    )
}

fn sign_up_use_case(repo: &MemRepo, config: &Arc<AuthConfig>) -> SignUpUseCase<MemRepo, MemRepo> {
    SignUpUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        config.clone(),
    )
}

fn sign_in_use_case(
    repo: &MemRepo,
    config: &Arc<AuthConfig>,
) -> SignInUseCase<MemRepo, MemRepo, MemRepo, MemRepo, MemRepo> {
    SignInUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        config.clone(),
    )
}

fn verify_use_case(
    repo: &MemRepo,
    config: &Arc<AuthConfig>,
) -> VerifyTwoFactorUseCase<MemRepo, MemRepo, MemRepo, MemRepo, MemRepo, MemRepo, MemRepo> {
    VerifyTwoFactorUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        config.clone(),
    )
}

fn totp_use_case(
    repo: &MemRepo,
    config: &Arc<AuthConfig>,
) -> TotpSetupUseCase<MemRepo, MemRepo, MemRepo> {
    TotpSetupUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        config.clone(),
    )
}

fn oauth_use_case(
    repo: &MemRepo,
    gateway: FakeGateway,
    config: &Arc<AuthConfig>,
) -> OAuthUseCase<MemRepo, MemRepo, MemRepo, MemRepo, MemRepo, FakeGateway> {
    OAuthUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(gateway),
        config.clone(),
    )
}

async fn register(repo: &MemRepo, config: &Arc<AuthConfig>) -> AccountId {
    let output = sign_up_use_case(repo, config)
        .execute(SignUpInput {
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
            display_name: "Traveler".to_string(),
        })
        .await
        .expect("sign up succeeds");

    let state = repo.state.lock().unwrap();
    let account = state
        .accounts
        .iter()
        .find(|a| a.public_id.to_string() == output.public_id)
        .expect("account stored");
    account.account_id
}

fn sign_in_input(password: &str) -> SignInInput {
    SignInInput {
        email: EMAIL.to_string(),
        password: password.to_string(),
        remember_me: false,
        trusted_device_id: None,
    }
}

/// Enable TOTP for the account through the regular setup flow; returns
/// the freshly minted backup codes
async fn enable_totp(repo: &MemRepo, config: &Arc<AuthConfig>, account_id: &AccountId) -> Vec<String> {
    let totp = totp_use_case(repo, config);
    totp.setup(account_id).await.expect("setup succeeds");

    let code = current_totp_code(repo, config, account_id);
    totp.confirm(account_id, &code).await.expect("confirm succeeds")
}

/// Generate the code an authenticator app would show right now
fn current_totp_code(repo: &MemRepo, config: &Arc<AuthConfig>, account_id: &AccountId) -> String {
    let credentials = repo.credentials_of(account_id);
    let secret = credentials.totp_secret.as_ref().expect("secret provisioned");
    secret
        .generate_at(
            Utc::now().timestamp() as u64,
            &config.cipher(),
            &config.totp_issuer,
            EMAIL,
        )
        .expect("code generated")
}

// ============================================================================
// Scenarios
// ============================================================================

mod sign_up_tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let outcome = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("sign in succeeds");

        let SignInOutcome::SignedIn(issued) = outcome else {
            panic!("expected a session, got a challenge");
        };
        assert!(!issued.session_token.is_empty());
        assert!(!issued.remember_me);

        // Session token resolves back to the account
        let check = CheckSessionUseCase::new(Arc::new(repo.clone()), config.clone());
        let info = check
            .execute(&issued.session_token, &fingerprint().hash)
            .await
            .expect("session valid");
        assert_eq!(info.public_id, issued.public_id);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let result = sign_up_use_case(&repo, &config)
            .execute(SignUpInput {
                email: EMAIL.to_string(),
                password: "Another!Passw0rd".to_string(),
                display_name: "Impostor".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_fail_alike() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let wrong_password = sign_in_use_case(&repo, &config)
            .execute(sign_in_input("Wrong!Passw0rd"), fingerprint())
            .await;
        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));

        let unknown_email = sign_in_use_case(&repo, &config)
            .execute(
                SignInInput {
                    email: "nobody@example.com".to_string(),
                    ..sign_in_input(PASSWORD)
                },
                fingerprint(),
            )
            .await;
        assert!(matches!(unknown_email, Err(AuthError::InvalidCredentials)));
    }
}

mod lockout_tests {
    use super::*;

    #[tokio::test]
    async fn test_account_locks_after_repeated_failures() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        for _ in 0..config.max_login_attempts {
            let result = sign_in_use_case(&repo, &config)
                .execute(sign_in_input("Wrong!Passw0rd"), fingerprint())
                .await;
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }

        assert!(repo.credentials_of(&account_id).is_locked());

        // Even the right password is rejected while the lock holds
        let result = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await;
        let Err(AuthError::AccountLocked { retry_after_secs }) = result else {
            panic!("expected a locked rejection");
        };
        assert!(retry_after_secs > 0);
    }

    #[tokio::test]
    async fn test_locked_attempts_do_not_extend_the_lock() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        for _ in 0..config.max_login_attempts {
            let _ = sign_in_use_case(&repo, &config)
                .execute(sign_in_input("Wrong!Passw0rd"), fingerprint())
                .await;
        }
        let locked_until = repo.credentials_of(&account_id).locked_until;
        assert!(locked_until.is_some());

        for _ in 0..3 {
            let _ = sign_in_use_case(&repo, &config)
                .execute(sign_in_input("Wrong!Passw0rd"), fingerprint())
                .await;
        }
        assert_eq!(repo.credentials_of(&account_id).locked_until, locked_until);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        for _ in 0..2 {
            let _ = sign_in_use_case(&repo, &config)
                .execute(sign_in_input("Wrong!Passw0rd"), fingerprint())
                .await;
        }
        assert_eq!(repo.credentials_of(&account_id).login_failed_count, 2);

        sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("sign in succeeds");

        assert_eq!(repo.credentials_of(&account_id).login_failed_count, 0);
    }
}

mod two_factor_tests {
    use super::*;

    #[tokio::test]
    async fn test_totp_sign_in_roundtrip() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        let backup_codes = enable_totp(&repo, &config, &account_id).await;
        assert_eq!(backup_codes.len(), 10);

        // Password alone is no longer enough
        let outcome = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("password step succeeds");
        let SignInOutcome::ChallengeRequired { challenge } = outcome else {
            panic!("expected a second-factor challenge");
        };

        // A current TOTP code completes the sign-in
        let output = verify_use_case(&repo, &config)
            .execute(
                TwoFactorInput {
                    challenge,
                    code: current_totp_code(&repo, &config, &account_id),
                    trust_device: false,
                },
                fingerprint(),
            )
            .await
            .expect("verification succeeds");

        assert!(output.trusted_device_id.is_none());
        assert!(output.backup_codes_remaining.is_none());
    }

    #[tokio::test]
    async fn test_trusted_device_skips_second_factor() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        enable_totp(&repo, &config, &account_id).await;

        let SignInOutcome::ChallengeRequired { challenge } = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("password step succeeds")
        else {
            panic!("expected a challenge");
        };

        let output = verify_use_case(&repo, &config)
            .execute(
                TwoFactorInput {
                    challenge,
                    code: current_totp_code(&repo, &config, &account_id),
                    trust_device: true,
                },
                fingerprint(),
            )
            .await
            .expect("verification succeeds");
        let device_id = output.trusted_device_id.expect("trust granted");

        // Next sign-in from the trusted device goes straight through
        let outcome = sign_in_use_case(&repo, &config)
            .execute(
                SignInInput {
                    trusted_device_id: Some(device_id),
                    ..sign_in_input(PASSWORD)
                },
                fingerprint(),
            )
            .await
            .expect("sign in succeeds");
        assert!(matches!(outcome, SignInOutcome::SignedIn(_)));

        // An unknown device token still gets challenged
        let outcome = sign_in_use_case(&repo, &config)
            .execute(
                SignInInput {
                    trusted_device_id: Some("forged-token".to_string()),
                    ..sign_in_input(PASSWORD)
                },
                fingerprint(),
            )
            .await
            .expect("password step succeeds");
        assert!(matches!(outcome, SignInOutcome::ChallengeRequired { .. }));
    }

    #[tokio::test]
    async fn test_trusted_devices_capped_oldest_evicted() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        enable_totp(&repo, &config, &account_id).await;

        // Trust one device past the cap, each through the full verify flow
        let mut device_ids = Vec::new();
        for _ in 0..config.trusted_device_cap + 1 {
            let SignInOutcome::ChallengeRequired { challenge } = sign_in_use_case(&repo, &config)
                .execute(sign_in_input(PASSWORD), fingerprint())
                .await
                .expect("password step succeeds")
            else {
                panic!("expected a challenge");
            };

            let output = verify_use_case(&repo, &config)
                .execute(
                    TwoFactorInput {
                        challenge,
                        code: current_totp_code(&repo, &config, &account_id),
                        trust_device: true,
                    },
                    fingerprint(),
                )
                .await
                .expect("verification succeeds");
            device_ids.push(output.trusted_device_id.expect("trust granted"));
        }

        let state = repo.state.lock().unwrap();
        let remaining: Vec<&str> = state
            .devices
            .iter()
            .filter(|d| d.account_id == account_id)
            .map(|d| d.device_id.as_str())
            .collect();

        // The first grant is evicted; every later one survives
        assert_eq!(remaining.len(), config.trusted_device_cap as usize);
        assert!(!remaining.contains(&device_ids[0].as_str()));
        for device_id in &device_ids[1..] {
            assert!(remaining.contains(&device_id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_backup_code_is_single_use() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        let backup_codes = enable_totp(&repo, &config, &account_id).await;
        let spent_code = backup_codes[0].clone();

        let SignInOutcome::ChallengeRequired { challenge } = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("password step succeeds")
        else {
            panic!("expected a challenge");
        };

        let output = verify_use_case(&repo, &config)
            .execute(
                TwoFactorInput {
                    challenge,
                    code: spent_code.clone(),
                    trust_device: false,
                },
                fingerprint(),
            )
            .await
            .expect("backup code accepted");
        assert_eq!(output.backup_codes_remaining, Some(9));

        // The same code a second time is a wrong code
        let SignInOutcome::ChallengeRequired { challenge } = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("password step succeeds")
        else {
            panic!("expected a challenge");
        };

        let result = verify_use_case(&repo, &config)
            .execute(
                TwoFactorInput {
                    challenge,
                    code: spent_code,
                    trust_device: false,
                },
                fingerprint(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
    }

    #[tokio::test]
    async fn test_verification_attempts_are_throttled() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        enable_totp(&repo, &config, &account_id).await;

        let SignInOutcome::ChallengeRequired { challenge } = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("password step succeeds")
        else {
            panic!("expected a challenge");
        };

        // Burn through the window with codes that cannot match
        for _ in 0..config.twofa_throttle.max_requests {
            let result = verify_use_case(&repo, &config)
                .execute(
                    TwoFactorInput {
                        challenge: challenge.clone(),
                        code: "00000x".to_string(),
                        trust_device: false,
                    },
                    fingerprint(),
                )
                .await;
            assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
        }

        let result = verify_use_case(&repo, &config)
            .execute(
                TwoFactorInput {
                    challenge: challenge.clone(),
                    code: current_totp_code(&repo, &config, &account_id),
                    trust_device: false,
                },
                fingerprint(),
            )
            .await;
        let Err(AuthError::TooManyTwoFactorAttempts { retry_after_secs }) = result else {
            panic!("expected throttling");
        };
        assert!(retry_after_secs > 0);
    }

    #[tokio::test]
    async fn test_disable_requires_current_code() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        enable_totp(&repo, &config, &account_id).await;

        let totp = totp_use_case(&repo, &config);
        let result = totp.disable(&account_id, "00000x").await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));

        let code = current_totp_code(&repo, &config, &account_id);
        totp.disable(&account_id, &code).await.expect("disable succeeds");

        assert!(!repo.credentials_of(&account_id).requires_two_factor());
        // Backup codes die with the second factor
        let status = totp.status(&account_id).await.unwrap();
        assert!(!status.enabled);
        assert_eq!(status.backup_codes_remaining, 0);
    }
}

mod oauth_tests {
    use super::*;

    fn google_profile(email: &str, verified: bool) -> NormalizedProfile {
        NormalizedProfile {
            provider: OAuthProvider::Google,
            provider_id: "g-1001".to_string(),
            email: email.to_string(),
            email_verified: verified,
            name: Some("Traveler".to_string()),
            avatar_url: Some("https://lh3.example.com/a.png".to_string()),
            profile_url: None,
        }
    }

    /// Run begin + callback with a matching state cookie
    async fn oauth_sign_in(
        use_case: &OAuthUseCase<MemRepo, MemRepo, MemRepo, MemRepo, MemRepo, FakeGateway>,
    ) -> AuthResult<OAuthCallbackOutcome> {
        let (_url, state) = use_case.begin(OAuthProvider::Google)?;
        use_case
            .callback(
                OAuthProvider::Google,
                "auth-code",
                &state,
                &state,
                None,
                fingerprint(),
            )
            .await
    }

    #[tokio::test]
    async fn test_first_callback_creates_passwordless_account() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile("nomad@example.com", true)),
            &config,
        );

        let outcome = oauth_sign_in(&use_case).await.expect("callback succeeds");
        assert!(matches!(outcome, OAuthCallbackOutcome::SignedIn(_)));

        {
            let state = repo.state.lock().unwrap();
            assert_eq!(state.accounts.len(), 1);
            assert_eq!(state.identities.len(), 1);
            assert!(state.credentials[0].password_hash.is_none());
        }

        // The second callback signs into the same account
        let outcome = oauth_sign_in(&use_case).await.expect("callback succeeds");
        assert!(matches!(outcome, OAuthCallbackOutcome::SignedIn(_)));
        assert_eq!(repo.state.lock().unwrap().accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_verified_email_links_to_existing_account() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile(EMAIL, true)),
            &config,
        );

        let outcome = oauth_sign_in(&use_case).await.expect("callback succeeds");
        assert!(matches!(outcome, OAuthCallbackOutcome::SignedIn(_)));

        let state = repo.state.lock().unwrap();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.identities[0].account_id, account_id);
    }

    #[tokio::test]
    async fn test_unverified_email_never_auto_links() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile(EMAIL, false)),
            &config,
        );

        let result = oauth_sign_in(&use_case).await;
        assert!(matches!(result, Err(AuthError::EmailTaken)));
        assert!(repo.state.lock().unwrap().identities.is_empty());
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile("nomad@example.com", true)),
            &config,
        );

        let (_url, state) = use_case.begin(OAuthProvider::Google).unwrap();
        let (_url, other_state) = use_case.begin(OAuthProvider::Google).unwrap();

        let result = use_case
            .callback(
                OAuthProvider::Google,
                "auth-code",
                &state,
                &other_state,
                None,
                fingerprint(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_oauth_respects_local_two_factor() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;
        enable_totp(&repo, &config, &account_id).await;

        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile(EMAIL, true)),
            &config,
        );

        let outcome = oauth_sign_in(&use_case).await.expect("callback succeeds");
        assert!(matches!(
            outcome,
            OAuthCallbackOutcome::ChallengeRequired { .. }
        ));
        // No session until the second factor clears
        assert!(repo.state.lock().unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_refuses_last_sign_in_method() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile("nomad@example.com", true)),
            &config,
        );

        oauth_sign_in(&use_case).await.expect("callback succeeds");
        let account_id = repo.state.lock().unwrap().accounts[0].account_id;

        // Passwordless account with one provider: disconnect would strand it
        let result = use_case.disconnect(&account_id, OAuthProvider::Google).await;
        assert!(matches!(result, Err(AuthError::LastAuthMethod)));

        // Not connected at all is a plain validation error
        let result = use_case.disconnect(&account_id, OAuthProvider::GitHub).await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn test_password_account_can_disconnect_provider() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile("nomad@example.com", true)),
            &config,
        );

        // Signed-in callback attaches the provider to the password account
        let (_url, state) = use_case.begin(OAuthProvider::Google).unwrap();
        let outcome = use_case
            .callback(
                OAuthProvider::Google,
                "auth-code",
                &state,
                &state,
                Some(account_id),
                fingerprint(),
            )
            .await
            .expect("link succeeds");
        assert!(matches!(outcome, OAuthCallbackOutcome::Linked));
        assert_eq!(use_case.list(&account_id).await.unwrap().len(), 1);

        // The password remains a way in, so the link may go
        use_case
            .disconnect(&account_id, OAuthProvider::Google)
            .await
            .expect("disconnect succeeds");
        assert!(use_case.list(&account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_rejected() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let use_case = oauth_use_case(
            &repo,
            FakeGateway::returning(google_profile("nomad@example.com", true)),
            &config,
        );

        let result = use_case.begin(OAuthProvider::Vk);
        assert!(matches!(result, Err(AuthError::UnsupportedProvider(_))));
    }
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_out_invalidates_the_session() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let SignInOutcome::SignedIn(issued) = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("sign in succeeds")
        else {
            panic!("expected a session");
        };

        let sign_out = SignOutUseCase::new(Arc::new(repo.clone()), config.clone());
        sign_out.execute(&issued.session_token).await.expect("sign out");

        let check = CheckSessionUseCase::new(Arc::new(repo.clone()), config.clone());
        assert!(!check.is_valid(&issued.session_token, &fingerprint().hash).await);
    }

    #[tokio::test]
    async fn test_sign_out_all_keeps_current_session() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let mut tokens = Vec::new();
        for _ in 0..3 {
            let SignInOutcome::SignedIn(issued) = sign_in_use_case(&repo, &config)
                .execute(sign_in_input(PASSWORD), fingerprint())
                .await
                .expect("sign in succeeds")
            else {
                panic!("expected a session");
            };
            tokens.push(issued.session_token);
        }

        let sign_out = SignOutUseCase::new(Arc::new(repo.clone()), config.clone());
        let revoked = sign_out
            .execute_all(&tokens[2], &fingerprint().hash)
            .await
            .expect("sign out all");
        assert_eq!(revoked, 2);

        let check = CheckSessionUseCase::new(Arc::new(repo.clone()), config.clone());
        assert!(check.is_valid(&tokens[2], &fingerprint().hash).await);
        assert!(!check.is_valid(&tokens[0], &fingerprint().hash).await);
    }

    #[tokio::test]
    async fn test_account_session_timeout_override() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        {
            let mut state = repo.state.lock().unwrap();
            let credentials = state
                .credentials
                .iter_mut()
                .find(|c| c.account_id == account_id)
                .unwrap();
            credentials.session_timeout_secs = Some(600);
        }

        let SignInOutcome::SignedIn(issued) = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("sign in succeeds")
        else {
            panic!("expected a session");
        };

        // Ten minutes, not the configured twelve-hour default
        let ttl_ms = issued.expires_at_ms - Utc::now().timestamp_millis();
        assert!(ttl_ms <= 600 * 1000);
        assert!(ttl_ms > 590 * 1000);
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_rejected() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        register(&repo, &config).await;

        let SignInOutcome::SignedIn(issued) = sign_in_use_case(&repo, &config)
            .execute(sign_in_input(PASSWORD), fingerprint())
            .await
            .expect("sign in succeeds")
        else {
            panic!("expected a session");
        };

        let check = CheckSessionUseCase::new(Arc::new(repo.clone()), config.clone());
        assert!(check.is_valid(&issued.session_token, &fingerprint().hash).await);
        // Same token presented from a different client
        assert!(!check.is_valid(&issued.session_token, &[9u8; 32]).await);
    }
}

mod login_history_tests {
    use super::*;
    use crate::domain::entity::login_event::LoginMethod;

    #[tokio::test]
    async fn test_history_keeps_only_newest_events() {
        let repo = MemRepo::new();
        let config = Arc::new(test_config());
        let account_id = register(&repo, &config).await;

        // Drive the port past the cap the way the sign-in paths do
        let cap = config.login_history_cap;
        for i in 0..cap + 5 {
            let event = LoginEvent::new(
                account_id,
                true,
                LoginMethod::Password,
                Some(format!("198.51.100.{i}")),
                None,
            );
            repo.append_with_cap(&event, cap).await.unwrap();
        }

        let events = repo.find_recent(&account_id, cap + 10).await.unwrap();
        assert_eq!(events.len(), cap as usize);

        // Newest first; the overflow rows fell off the old end
        assert_eq!(
            events[0].client_ip.as_deref(),
            Some(format!("198.51.100.{}", cap + 4).as_str())
        );
        let surviving: Vec<String> = events.iter().filter_map(|e| e.client_ip.clone()).collect();
        assert!(!surviving.contains(&"198.51.100.4".to_string()));
        assert!(surviving.contains(&"198.51.100.5".to_string()));
    }
}
