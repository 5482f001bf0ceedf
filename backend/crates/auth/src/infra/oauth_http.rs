//! OAuth Provider HTTP Client
//!
//! Implements the [`OAuthGateway`] port against the real provider
//! endpoints. Each provider's quirks stay inside its adapter function:
//! GitHub hides verified emails behind a second call, VK ships the email
//! with the token response and numbers its API versions.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::application::config::OAuthProviderConfig;
use crate::application::oauth::{OAuthGateway, OAuthTokens, VK_API_VERSION};
use crate::domain::value_object::oauth_provider::{NormalizedProfile, OAuthProvider};
use crate::error::{AuthError, AuthResult};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const VK_TOKEN_URL: &str = "https://oauth.vk.com/access_token";
const VK_USERS_GET_URL: &str = "https://api.vk.com/method/users.get";

/// User-Agent for provider API calls (GitHub rejects requests without one)
const API_USER_AGENT: &str = "trekora-auth";

/// reqwest-backed OAuth gateway
#[derive(Clone)]
pub struct HttpOAuthGateway {
    client: Client,
}

impl HttpOAuthGateway {
    /// Build a gateway with the given per-request timeout
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(API_USER_AGENT)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl OAuthGateway for HttpOAuthGateway {
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens> {
        match provider {
            OAuthProvider::Google => self.exchange_google(provider_config, code).await,
            OAuthProvider::GitHub => self.exchange_github(provider_config, code).await,
            OAuthProvider::Vk => self.exchange_vk(provider_config, code).await,
        }
    }

    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        tokens: &OAuthTokens,
    ) -> AuthResult<NormalizedProfile> {
        match provider {
            OAuthProvider::Google => self.profile_google(tokens).await,
            OAuthProvider::GitHub => self.profile_github(tokens).await,
            OAuthProvider::Vk => self.profile_vk(tokens).await,
        }
    }
}

// ============================================================================
// Google
// ============================================================================

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl HttpOAuthGateway {
    async fn exchange_google(
        &self,
        provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", &provider_config.client_id),
                ("client_secret", &provider_config.client_secret),
                ("redirect_uri", &provider_config.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let token: GoogleTokenResponse =
            decode_response(response, AuthError::TokenExchange).await?;

        Ok(OAuthTokens {
            access_token: token.access_token,
            email: None,
        })
    }

    async fn profile_google(&self, tokens: &OAuthTokens) -> AuthResult<NormalizedProfile> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let info: GoogleUserInfo = decode_response(response, AuthError::ProfileFetch).await?;

        Ok(NormalizedProfile {
            provider: OAuthProvider::Google,
            provider_id: info.sub,
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
            avatar_url: info.picture,
            profile_url: None,
        })
    }
}

// ============================================================================
// GitHub
// ============================================================================

#[derive(Deserialize)]
struct GitHubTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl HttpOAuthGateway {
    async fn exchange_github(
        &self,
        provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens> {
        // GitHub answers with urlencoded unless JSON is asked for
        let response = self
            .client
            .post(GITHUB_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("code", code),
                ("client_id", &provider_config.client_id),
                ("client_secret", &provider_config.client_secret),
                ("redirect_uri", &provider_config.redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let token: GitHubTokenResponse =
            decode_response(response, AuthError::TokenExchange).await?;

        Ok(OAuthTokens {
            access_token: token.access_token,
            email: None,
        })
    }

    async fn profile_github(&self, tokens: &OAuthTokens) -> AuthResult<NormalizedProfile> {
        let response = self
            .client
            .get(GITHUB_USER_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let user: GitHubUser = decode_response(response, AuthError::ProfileFetch).await?;

        let (email, email_verified) = match self.github_primary_email(tokens).await? {
            Some(verified_email) => (verified_email, true),
            None => match user.email.clone() {
                // Public profile email; GitHub does not say whether it is
                // verified through this endpoint
                Some(public_email) => (public_email, false),
                None => (format!("{}@users.noreply.github.com", user.id), false),
            },
        };

        Ok(NormalizedProfile {
            provider: OAuthProvider::GitHub,
            provider_id: user.id.to_string(),
            email,
            email_verified,
            name: user.name.or(Some(user.login)),
            avatar_url: user.avatar_url,
            profile_url: user.html_url,
        })
    }

    /// The user's primary verified email, when the scope allows reading it
    async fn github_primary_email(&self, tokens: &OAuthTokens) -> AuthResult<Option<String>> {
        let response = self
            .client
            .get(GITHUB_EMAILS_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        // Missing user:email scope is not fatal; the caller falls back
        if !response.status().is_success() {
            return Ok(None);
        }

        let emails: Vec<GitHubEmail> = response
            .json()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

// ============================================================================
// VK
// ============================================================================

#[derive(Deserialize)]
struct VkTokenResponse {
    access_token: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct VkUsersGetResponse {
    response: Vec<VkUser>,
}

#[derive(Deserialize)]
struct VkUser {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    photo_200: Option<String>,
    screen_name: Option<String>,
}

impl HttpOAuthGateway {
    async fn exchange_vk(
        &self,
        provider_config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthTokens> {
        let response = self
            .client
            .get(VK_TOKEN_URL)
            .query(&[
                ("code", code),
                ("client_id", &provider_config.client_id),
                ("client_secret", &provider_config.client_secret),
                ("redirect_uri", &provider_config.redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let token: VkTokenResponse = decode_response(response, AuthError::TokenExchange).await?;

        Ok(OAuthTokens {
            access_token: token.access_token,
            // VK reports the email here, not in the profile API
            email: token.email,
        })
    }

    async fn profile_vk(&self, tokens: &OAuthTokens) -> AuthResult<NormalizedProfile> {
        let response = self
            .client
            .get(VK_USERS_GET_URL)
            .query(&[
                ("fields", "photo_200,screen_name"),
                ("v", VK_API_VERSION),
                ("access_token", &tokens.access_token),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let body: VkUsersGetResponse = decode_response(response, AuthError::ProfileFetch).await?;
        let user = body
            .response
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::ProfileFetch("VK returned an empty user list".to_string()))?;

        let name = match (&user.first_name, &user.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        };

        let profile_url = Some(match &user.screen_name {
            Some(screen_name) => format!("https://vk.com/{screen_name}"),
            None => format!("https://vk.com/id{}", user.id),
        });

        Ok(NormalizedProfile {
            provider: OAuthProvider::Vk,
            provider_id: user.id.to_string(),
            // VK only reports confirmed emails with the token
            email: tokens.email.clone().unwrap_or_default(),
            email_verified: tokens.email.is_some(),
            name,
            avatar_url: user.photo_200,
            profile_url,
        })
    }
}

// ============================================================================

/// Decode a provider response, mapping failure statuses and bad payloads
/// to the given error constructor
async fn decode_response<T, F>(response: reqwest::Response, make_error: F) -> AuthResult<T>
where
    T: serde::de::DeserializeOwned,
    F: Fn(String) -> AuthError,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(make_error(format!("HTTP {status}: {body}")));
    }

    response.json().await.map_err(|e| make_error(e.to_string()))
}
