//! Application Configuration
//!
//! Configuration for the Auth application layer. The binary assembles
//! this from environment variables; use cases only consume it.

use std::time::Duration;

use platform::cipher::SecretCipher;
use platform::csrf::CsrfGuard;
use platform::rate_limit::RateLimitConfig;

use crate::domain::value_object::oauth_provider::OAuthProvider;

/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// Per-provider OAuth application credentials
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Auth application configuration
#[derive(Clone)]
pub struct AuthConfig {
    // -- sessions ------------------------------------------------------
    /// Session cookie name
    pub session_cookie_name: String,
    /// Session secret key for HMAC signing (32 bytes)
    pub session_secret: [u8; 32],
    /// Session TTL without "Remember Me" (12 hours)
    pub session_ttl_short: Duration,
    /// Session TTL with "Remember Me" (1 week)
    pub session_ttl_long: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,

    // -- passwords and secrets ----------------------------------------
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
    /// Master key for at-rest encryption of stored secrets (32 bytes)
    pub master_key: [u8; 32],

    // -- lockout -------------------------------------------------------
    /// Failed attempts before the account is temporarily locked
    pub max_login_attempts: u16,
    /// How long the lock holds
    pub lockout_duration: Duration,

    // -- two-factor ----------------------------------------------------
    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,
    /// Lifetime of the sign-in 2FA challenge reference
    pub challenge_ttl: Duration,
    /// Throttle on verification-code attempts (separate from lockout)
    pub twofa_throttle: RateLimitConfig,

    // -- trusted devices -----------------------------------------------
    /// Trusted device cookie name
    pub device_cookie_name: String,
    /// How long a device trust grant lasts
    pub trusted_device_ttl: Duration,
    /// Maximum devices per account (oldest evicted beyond this)
    pub trusted_device_cap: u32,

    // -- login history -------------------------------------------------
    /// Events retained per account (oldest evicted beyond this)
    pub login_history_cap: u32,

    // -- CSRF ----------------------------------------------------------
    /// Anti-forgery secret (32 bytes)
    pub csrf_secret: [u8; 32],
    /// Header the token is read from
    pub csrf_header_name: String,
    /// Cookie the token is issued into (script-readable)
    pub csrf_cookie_name: String,
    /// Anti-forgery token lifetime
    pub csrf_token_ttl: Duration,
    /// Origins accepted by the Origin/Referer check; empty = permissive
    pub allowed_origins: Vec<String>,

    // -- OAuth ---------------------------------------------------------
    pub google: Option<OAuthProviderConfig>,
    pub github: Option<OAuthProviderConfig>,
    pub vk: Option<OAuthProviderConfig>,
    /// State cookie name for the redirect round-trip
    pub oauth_state_cookie_name: String,
    /// Bound on provider HTTP calls (token exchange, profile fetch)
    pub oauth_http_timeout: Duration,
    /// Where the browser lands after a completed OAuth callback
    pub post_oauth_redirect: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "auth_session".to_string(),
            session_secret: [0u8; 32],
            session_ttl_short: Duration::from_secs(12 * 3600), // 12 hours
            session_ttl_long: Duration::from_secs(7 * 24 * 3600), // 1 week
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            password_pepper: None,
            master_key: [0u8; 32],
            max_login_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            totp_issuer: "Trekora".to_string(),
            challenge_ttl: Duration::from_secs(5 * 60),
            twofa_throttle: RateLimitConfig::new(5, 15 * 60),
            device_cookie_name: "trusted_device".to_string(),
            trusted_device_ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
            trusted_device_cap: 10,
            login_history_cap: 50,
            csrf_secret: [0u8; 32],
            csrf_header_name: "x-csrf-token".to_string(),
            csrf_cookie_name: "csrf_token".to_string(),
            csrf_token_ttl: Duration::from_secs(3600),
            allowed_origins: Vec::new(),
            google: None,
            github: None,
            vk: None,
            oauth_state_cookie_name: "oauth_state".to_string(),
            oauth_http_timeout: Duration::from_secs(10),
            post_oauth_redirect: "/".to_string(),
        }
    }
}

impl AuthConfig {
    /// Create config with random secrets (for development)
    pub fn with_random_secret() -> Self {
        use rand::RngCore;
        let mut rng = rand::rng();

        let mut session_secret = [0u8; 32];
        rng.fill_bytes(&mut session_secret);
        let mut master_key = [0u8; 32];
        rng.fill_bytes(&mut master_key);
        let mut csrf_secret = [0u8; 32];
        rng.fill_bytes(&mut csrf_secret);

        Self {
            session_secret,
            master_key,
            csrf_secret,
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secret()
        }
    }

    /// Get session TTL in milliseconds
    pub fn session_ttl_short_ms(&self) -> i64 {
        self.session_ttl_short.as_millis() as i64
    }

    /// Get session TTL with Remember Me in milliseconds
    pub fn session_ttl_long_ms(&self) -> i64 {
        self.session_ttl_long.as_millis() as i64
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    /// Build the secret cipher for at-rest encryption
    pub fn cipher(&self) -> SecretCipher {
        SecretCipher::new(self.master_key)
    }

    /// Build the anti-forgery guard
    pub fn csrf_guard(&self) -> CsrfGuard {
        CsrfGuard::with_ttl_ms(self.csrf_secret, self.csrf_token_ttl.as_millis() as i64)
    }

    /// Lookup provider credentials
    pub fn provider(&self, provider: OAuthProvider) -> Option<&OAuthProviderConfig> {
        match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::GitHub => self.github.as_ref(),
            OAuthProvider::Vk => self.vk.as_ref(),
        }
    }

    /// Lockout duration as chrono Duration
    pub fn lockout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lockout_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(15))
    }

    /// Trusted device TTL as chrono Duration
    pub fn trusted_device_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.trusted_device_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(30))
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets redacted
        f.debug_struct("AuthConfig")
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_ttl_short", &self.session_ttl_short)
            .field("session_ttl_long", &self.session_ttl_long)
            .field("cookie_secure", &self.cookie_secure)
            .field("max_login_attempts", &self.max_login_attempts)
            .field("lockout_duration", &self.lockout_duration)
            .field("totp_issuer", &self.totp_issuer)
            .field("trusted_device_cap", &self.trusted_device_cap)
            .field("login_history_cap", &self.login_history_cap)
            .field("google", &self.google.is_some())
            .field("github", &self.github.is_some())
            .field("vk", &self.vk.is_some())
            .finish_non_exhaustive()
    }
}
