//! OAuth Federation Use Case
//!
//! Sign-in and account linking through external identity providers
//! (Google, GitHub, VK). The provider HTTP conversation lives behind the
//! [`OAuthGateway`] port; this use case owns the state check and the
//! account resolution rules:
//!
//! 1. an existing `(provider, provider_id)` link signs into its account
//! 2. otherwise a verified provider email matching an existing account
//!    links the identity to that account
//! 3. otherwise a new passwordless account is created
//!
//! An unverified provider email never auto-links (that would let anyone
//! who can register the address at the provider take the account over).

use std::sync::Arc;

use platform::client::ClientFingerprint;
use url::Url;

use crate::application::config::{AuthConfig, OAuthProviderConfig};
use crate::application::session::{self, IssuedSession};
use crate::application::token;
use crate::domain::entity::account::Account;
use crate::domain::entity::credentials::Credentials;
use crate::domain::entity::login_event::LoginMethod;
use crate::domain::entity::oauth_identity::OAuthIdentity;
use crate::domain::repository::{
    AccountRepository, AuthSessionRepository, CredentialsRepository, LoginHistoryRepository,
    OAuthIdentityRepository,
};
use crate::domain::value_object::account_id::AccountId;
use crate::domain::value_object::email::Email;
use crate::domain::value_object::oauth_provider::{NormalizedProfile, OAuthProvider};
use crate::error::{AuthError, AuthResult};

/// Tokens from the code-for-token exchange
///
/// VK delivers the user's email alongside the access token rather than in
/// the profile response, hence the extra field.
#[derive(Debug, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub email: Option<String>,
}

/// Port to the provider's HTTP endpoints; implemented in infrastructure
#[trait_variant::make(OAuthGateway: Send)]
pub trait LocalOAuthGateway {
    /// Exchange the callback code for an access token
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens>;

    /// Fetch the user's profile, normalized to the provider-neutral shape
    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        tokens: &OAuthTokens,
    ) -> AuthResult<NormalizedProfile>;
}

/// Where a completed callback ends up
pub enum OAuthCallbackOutcome {
    /// Signed in; session issued
    SignedIn(IssuedSession),
    /// Account has 2FA; the provider identity only covers the first factor
    ChallengeRequired { challenge: String },
    /// Link added to the already signed-in account
    Linked,
}

/// OAuth federation use case
pub struct OAuthUseCase<A, C, I, H, S, G>
where
    A: AccountRepository,
    C: CredentialsRepository,
    I: OAuthIdentityRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
    G: OAuthGateway,
{
    account_repo: Arc<A>,
    credentials_repo: Arc<C>,
    identity_repo: Arc<I>,
    history_repo: Arc<H>,
    session_repo: Arc<S>,
    gateway: Arc<G>,
    config: Arc<AuthConfig>,
}

impl<A, C, I, H, S, G> OAuthUseCase<A, C, I, H, S, G>
where
    A: AccountRepository,
    C: CredentialsRepository,
    I: OAuthIdentityRepository,
    H: LoginHistoryRepository,
    S: AuthSessionRepository,
    G: OAuthGateway,
{
    pub fn new(
        account_repo: Arc<A>,
        credentials_repo: Arc<C>,
        identity_repo: Arc<I>,
        history_repo: Arc<H>,
        session_repo: Arc<S>,
        gateway: Arc<G>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            account_repo,
            credentials_repo,
            identity_repo,
            history_repo,
            session_repo,
            gateway,
            config,
        }
    }

    /// Build the authorization redirect URL and the state value to pin in
    /// a cookie
    pub fn begin(&self, provider: OAuthProvider) -> AuthResult<(String, String)> {
        let provider_config = self.provider_config(provider)?;
        let state = token::generate_oauth_state(&self.config.session_secret);

        // VK wants comma-separated scopes and an API version pin
        let scope_separator = match provider {
            OAuthProvider::Vk => ",",
            _ => " ",
        };

        let mut url = Url::parse(authorize_endpoint(provider))
            .map_err(|e| AuthError::Internal(format!("Bad authorize endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &provider_config.client_id)
                .append_pair("redirect_uri", &provider_config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &provider_config.scopes.join(scope_separator))
                .append_pair("state", &state);

            if provider == OAuthProvider::Vk {
                query.append_pair("v", VK_API_VERSION);
            }
        }

        Ok((url.into(), state))
    }

    /// Handle the provider callback
    ///
    /// `link_to` carries the current account when a signed-in user is
    /// connecting a provider; `None` means a sign-in attempt.
    pub async fn callback(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
        cookie_state: &str,
        link_to: Option<AccountId>,
        fingerprint: ClientFingerprint,
    ) -> AuthResult<OAuthCallbackOutcome> {
        token::verify_oauth_state(&self.config.session_secret, state, cookie_state)?;

        let provider_config = self.provider_config(provider)?;
        let tokens = self
            .gateway
            .exchange_code(provider, provider_config, code)
            .await?;
        let profile = self.gateway.fetch_profile(provider, &tokens).await?;

        if let Some(account_id) = link_to {
            self.link(account_id, &profile).await?;
            return Ok(OAuthCallbackOutcome::Linked);
        }

        let (account, first_sign_in) = self.resolve_account(&profile).await?;

        if !account.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let credentials = self
            .credentials_repo
            .find_by_account_id(&account.account_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Credentials not found".to_string()))?;

        // A stolen provider session must not bypass the account's 2FA
        if credentials.requires_two_factor() {
            let challenge =
                token::issue_challenge(&self.config.session_secret, &account.account_id, false);
            return Ok(OAuthCallbackOutcome::ChallengeRequired { challenge });
        }

        let mut account = account;
        account.backfill_avatar(profile.avatar_url.clone());
        account.record_login();
        self.account_repo.update(&account).await?;

        let issued = session::issue_session(
            &self.session_repo,
            &self.config,
            &account,
            false,
            credentials.session_ttl_override(),
            &fingerprint,
        )
        .await?;

        session::record_login_event(
            &self.history_repo,
            &self.config,
            account.account_id,
            true,
            LoginMethod::OAuth(provider),
            &fingerprint,
        )
        .await;

        tracing::info!(
            public_id = %account.public_id,
            provider = %provider,
            first_sign_in,
            "OAuth sign-in completed"
        );

        Ok(OAuthCallbackOutcome::SignedIn(issued))
    }

    /// Remove a provider link from an account
    ///
    /// Refused when it is the account's last way in: no password and no
    /// other provider left.
    pub async fn disconnect(&self, account_id: &AccountId, provider: OAuthProvider) -> AuthResult<()> {
        let credentials = self
            .credentials_repo
            .find_by_account_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let links = self.identity_repo.find_by_account_id(account_id).await?;
        if !links.iter().any(|l| l.provider == provider) {
            return Err(AuthError::Validation("Provider is not connected".to_string()));
        }

        if !credentials.has_password() && links.len() <= 1 {
            return Err(AuthError::LastAuthMethod);
        }

        self.identity_repo.delete(account_id, provider).await?;

        tracing::info!(
            account_id = %account_id,
            provider = %provider,
            "OAuth provider disconnected"
        );

        Ok(())
    }

    /// List the account's provider links
    pub async fn list(&self, account_id: &AccountId) -> AuthResult<Vec<OAuthIdentity>> {
        self.identity_repo.find_by_account_id(account_id).await
    }

    // ------------------------------------------------------------------

    fn provider_config(&self, provider: OAuthProvider) -> AuthResult<&OAuthProviderConfig> {
        self.config
            .provider(provider)
            .ok_or_else(|| AuthError::UnsupportedProvider(provider.code().to_string()))
    }

    /// Attach the provider identity to an already signed-in account
    async fn link(&self, account_id: AccountId, profile: &NormalizedProfile) -> AuthResult<()> {
        if self
            .identity_repo
            .find_by_provider_id(profile.provider, &profile.provider_id)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateProviderLink);
        }

        let links = self.identity_repo.find_by_account_id(&account_id).await?;
        if links.iter().any(|l| l.provider == profile.provider) {
            return Err(AuthError::DuplicateProviderLink);
        }

        let identity = OAuthIdentity::from_profile(account_id, profile);
        self.identity_repo.create(&identity).await?;

        tracing::info!(
            account_id = %account_id,
            provider = %profile.provider,
            "OAuth provider connected"
        );

        Ok(())
    }

    /// Find or create the account behind a provider profile
    async fn resolve_account(&self, profile: &NormalizedProfile) -> AuthResult<(Account, bool)> {
        // 1. Existing link wins, whatever the provider says about email
        if let Some(mut identity) = self
            .identity_repo
            .find_by_provider_id(profile.provider, &profile.provider_id)
            .await?
        {
            identity.refresh_snapshot(profile);
            self.identity_repo.update_snapshot(&identity).await?;

            let account = self
                .account_repo
                .find_by_id(&identity.account_id)
                .await?
                .ok_or_else(|| AuthError::Internal("Linked account not found".to_string()))?;
            return Ok((account, false));
        }

        let email = Email::new(&profile.email).map_err(|_| {
            AuthError::ProfileFetch(format!(
                "{} returned an unusable email address",
                profile.provider.display_name()
            ))
        })?;

        // 2. Match an existing account by email, verified addresses only
        if let Some(account) = self.account_repo.find_by_email(&email).await? {
            if !profile.email_verified {
                return Err(AuthError::EmailTaken);
            }

            let identity = OAuthIdentity::from_profile(account.account_id, profile);
            self.identity_repo.create(&identity).await?;

            tracing::info!(
                public_id = %account.public_id,
                provider = %profile.provider,
                "OAuth identity linked to existing account by email"
            );

            return Ok((account, false));
        }

        // 3. Fresh passwordless account
        let display_name = profile
            .name
            .clone()
            .unwrap_or_else(|| email.as_str().to_string());

        let account = Account::new(email, display_name);
        let credentials = Credentials::new_passwordless(account.account_id);
        let identity = OAuthIdentity::from_profile(account.account_id, profile);

        self.account_repo.create(&account).await?;
        self.credentials_repo.create(&credentials).await?;
        self.identity_repo.create(&identity).await?;

        tracing::info!(
            public_id = %account.public_id,
            provider = %profile.provider,
            "Account created from OAuth profile"
        );

        Ok((account, true))
    }
}

/// VK API version pinned on authorize and API calls
pub const VK_API_VERSION: &str = "5.199";

/// Provider authorization endpoint (browser redirect target)
pub fn authorize_endpoint(provider: OAuthProvider) -> &'static str {
    match provider {
        OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        OAuthProvider::GitHub => "https://github.com/login/oauth/authorize",
        OAuthProvider::Vk => "https://oauth.vk.com/authorize",
    }
}
