//! Session Issuing
//!
//! Shared final step of every successful sign-in path (password, 2FA
//! verify, OAuth callback): persist the session, sign the cookie token,
//! and append the login history event.

use std::sync::Arc;

use platform::client::ClientFingerprint;

use crate::application::config::AuthConfig;
use crate::application::token;
use crate::domain::entity::account::Account;
use crate::domain::entity::auth_session::AuthSession;
use crate::domain::entity::login_event::{LoginEvent, LoginMethod};
use crate::domain::repository::{AuthSessionRepository, LoginHistoryRepository};
use crate::error::{AuthError, AuthResult};

/// A freshly issued session, ready for the cookie layer
pub struct IssuedSession {
    /// Signed token for the session cookie
    pub session_token: String,
    /// Public ID for API responses
    pub public_id: String,
    /// Role code for API responses
    pub role: String,
    /// Session expiration (Unix timestamp ms)
    pub expires_at_ms: i64,
    /// Whether "Remember Me" was requested
    pub remember_me: bool,
}

/// Persist a session for the account and sign its cookie token
///
/// `ttl_override` is the account's own session-timeout setting; when set
/// it takes precedence over both configured TTLs.
pub async fn issue_session<S>(
    session_repo: &Arc<S>,
    config: &AuthConfig,
    account: &Account,
    remember_me: bool,
    ttl_override: Option<chrono::Duration>,
    fingerprint: &ClientFingerprint,
) -> AuthResult<IssuedSession>
where
    S: AuthSessionRepository,
{
    let ttl = match ttl_override {
        Some(ttl) => Ok(ttl),
        None if remember_me => chrono::Duration::from_std(config.session_ttl_long),
        None => chrono::Duration::from_std(config.session_ttl_short),
    }
    .map_err(|e| AuthError::Internal(format!("Invalid session TTL: {e}")))?;

    let session = AuthSession::new(
        account.account_id,
        account.public_id.clone(),
        account.role,
        remember_me,
        fingerprint.hash.to_vec(),
        fingerprint.ip_string(),
        fingerprint.user_agent.clone(),
        ttl,
    );

    session_repo.create(&session).await?;

    let session_token = token::generate_session_token(&config.session_secret, session.session_id);

    Ok(IssuedSession {
        session_token,
        public_id: account.public_id.to_string(),
        role: account.role.code().to_string(),
        expires_at_ms: session.expires_at_ms,
        remember_me,
    })
}

/// Append a login history event, pruning beyond the configured cap
///
/// History is observability, not control flow: a failed append is logged
/// and swallowed so it can never block a sign-in.
pub async fn record_login_event<H>(
    history_repo: &Arc<H>,
    config: &AuthConfig,
    account_id: crate::domain::value_object::account_id::AccountId,
    success: bool,
    method: LoginMethod,
    fingerprint: &ClientFingerprint,
) where
    H: LoginHistoryRepository,
{
    let event = LoginEvent::new(
        account_id,
        success,
        method,
        fingerprint.ip_string(),
        fingerprint.user_agent.clone(),
    );

    if let Err(e) = history_repo
        .append_with_cap(&event, config.login_history_cap)
        .await
    {
        tracing::warn!(error = %e, "Failed to append login history event");
    }
}
