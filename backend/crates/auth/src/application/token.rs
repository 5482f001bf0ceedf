//! Signed Token Helpers
//!
//! HMAC-SHA256 signed opaque tokens handed to the browser:
//!
//! - session token: `{session_id}.{signature}`, references a stored session
//! - 2FA challenge: `{account_id}.{issued_ms}.{r}.{signature}`, stateless
//!   reference returned by sign-in when a second factor is still needed
//! - OAuth state: `{nonce}.{issued_ms}.{signature}`, round-tripped through
//!   a cookie to bind the callback to the initiating browser
//!
//! Signatures are base64 URL-safe without padding. Verification is
//! constant-time via `Mac::verify_slice`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::value_object::account_id::AccountId;
use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &[u8], payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

fn verify(secret: &[u8], payload: &str, signature_b64: &str) -> bool {
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature_b64) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).is_ok()
}

// ==================== Session tokens ====================

/// Generate a signed session token for the cookie
pub fn generate_session_token(secret: &[u8], session_id: Uuid) -> String {
    let id = session_id.to_string();
    let sig = sign(secret, &id);
    format!("{id}.{sig}")
}

/// Parse and verify a session token, returning the session ID
pub fn parse_session_token(secret: &[u8], token: &str) -> AuthResult<Uuid> {
    let (id, sig) = token.split_once('.').ok_or(AuthError::SessionInvalid)?;

    if !verify(secret, id, sig) {
        return Err(AuthError::SessionInvalid);
    }

    id.parse().map_err(|_| AuthError::SessionInvalid)
}

// ==================== 2FA challenge references ====================

/// Pending second-factor challenge decoded from a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoFactorChallenge {
    pub account_id: AccountId,
    pub remember_me: bool,
    pub issued_at_ms: i64,
}

/// Issue a challenge reference after the password step succeeded
pub fn issue_challenge(secret: &[u8], account_id: &AccountId, remember_me: bool) -> String {
    issue_challenge_at(secret, account_id, remember_me, Utc::now().timestamp_millis())
}

fn issue_challenge_at(
    secret: &[u8],
    account_id: &AccountId,
    remember_me: bool,
    issued_at_ms: i64,
) -> String {
    let r = if remember_me { 1 } else { 0 };
    let payload = format!("{}.{}.{}", account_id.as_uuid(), issued_at_ms, r);
    let sig = sign(secret, &payload);
    format!("{payload}.{sig}")
}

/// Parse and verify a challenge reference, enforcing its TTL
pub fn parse_challenge(secret: &[u8], token: &str, ttl_ms: i64) -> AuthResult<TwoFactorChallenge> {
    parse_challenge_at(secret, token, ttl_ms, Utc::now().timestamp_millis())
}

fn parse_challenge_at(
    secret: &[u8],
    token: &str,
    ttl_ms: i64,
    now_ms: i64,
) -> AuthResult<TwoFactorChallenge> {
    let (payload, sig) = token.rsplit_once('.').ok_or(AuthError::SessionInvalid)?;

    if !verify(secret, payload, sig) {
        return Err(AuthError::SessionInvalid);
    }

    let mut parts = payload.split('.');
    let (Some(id), Some(ts), Some(r), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::SessionInvalid);
    };

    let uuid: Uuid = id.parse().map_err(|_| AuthError::SessionInvalid)?;
    let issued_at_ms: i64 = ts.parse().map_err(|_| AuthError::SessionInvalid)?;
    let remember_me = match r {
        "1" => true,
        "0" => false,
        _ => return Err(AuthError::SessionInvalid),
    };

    let age = now_ms - issued_at_ms;
    if age < 0 || age > ttl_ms {
        return Err(AuthError::SessionInvalid);
    }

    Ok(TwoFactorChallenge {
        account_id: AccountId::from_uuid(uuid),
        remember_me,
        issued_at_ms,
    })
}

// ==================== OAuth state ====================

/// OAuth state lifetime: redirect round-trips finish well within this
pub const OAUTH_STATE_TTL_MS: i64 = 10 * 60 * 1000;

/// Generate a signed OAuth state value for the cookie and the
/// authorization URL
pub fn generate_oauth_state(secret: &[u8]) -> String {
    let nonce = platform::crypto::random_token_hex(16);
    let issued_at_ms = Utc::now().timestamp_millis();
    let payload = format!("{nonce}.{issued_at_ms}");
    let sig = sign(secret, &payload);
    format!("{payload}.{sig}")
}

/// Verify a state value returned by the provider against the cookie copy
pub fn verify_oauth_state(secret: &[u8], state: &str, cookie_state: &str) -> AuthResult<()> {
    verify_oauth_state_at(secret, state, cookie_state, Utc::now().timestamp_millis())
}

fn verify_oauth_state_at(
    secret: &[u8],
    state: &str,
    cookie_state: &str,
    now_ms: i64,
) -> AuthResult<()> {
    // The browser must return exactly what we set
    if !platform::crypto::constant_time_eq(state.as_bytes(), cookie_state.as_bytes()) {
        return Err(AuthError::InvalidState);
    }

    let (payload, sig) = state.rsplit_once('.').ok_or(AuthError::InvalidState)?;
    if !verify(secret, payload, sig) {
        return Err(AuthError::InvalidState);
    }

    let (_, ts) = payload.split_once('.').ok_or(AuthError::InvalidState)?;
    let issued_at_ms: i64 = ts.parse().map_err(|_| AuthError::InvalidState)?;

    let age = now_ms - issued_at_ms;
    if age < 0 || age > OAUTH_STATE_TTL_MS {
        return Err(AuthError::InvalidState);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = &[7u8; 32];

    #[test]
    fn test_session_token_roundtrip() {
        let id = Uuid::new_v4();
        let token = generate_session_token(SECRET, id);
        assert_eq!(parse_session_token(SECRET, &token).unwrap(), id);
    }

    #[test]
    fn test_session_token_wrong_secret() {
        let token = generate_session_token(SECRET, Uuid::new_v4());
        assert!(parse_session_token(&[8u8; 32], &token).is_err());
    }

    #[test]
    fn test_session_token_tampered_id() {
        let token = generate_session_token(SECRET, Uuid::new_v4());
        let other = Uuid::new_v4();
        let sig = token.split_once('.').unwrap().1;
        let forged = format!("{other}.{sig}");
        assert!(parse_session_token(SECRET, &forged).is_err());
    }

    #[test]
    fn test_challenge_roundtrip() {
        let account_id = AccountId::new();
        let token = issue_challenge_at(SECRET, &account_id, true, 1_000_000);

        let challenge = parse_challenge_at(SECRET, &token, 300_000, 1_000_000 + 299_999).unwrap();
        assert_eq!(challenge.account_id, account_id);
        assert!(challenge.remember_me);
    }

    #[test]
    fn test_challenge_expired() {
        let token = issue_challenge_at(SECRET, &AccountId::new(), false, 1_000_000);
        assert!(parse_challenge_at(SECRET, &token, 300_000, 1_000_000 + 300_001).is_err());
    }

    #[test]
    fn test_challenge_remember_me_not_forgeable() {
        let account_id = AccountId::new();
        let token = issue_challenge_at(SECRET, &account_id, false, 1_000_000);

        // Flip the remember_me field without re-signing
        let forged = token.replacen(".0.", ".1.", 1);
        assert!(parse_challenge_at(SECRET, &forged, 300_000, 1_000_000).is_err());
    }

    #[test]
    fn test_oauth_state_roundtrip() {
        let state = generate_oauth_state(SECRET);
        assert!(verify_oauth_state(SECRET, &state, &state).is_ok());
    }

    #[test]
    fn test_oauth_state_mismatch() {
        let a = generate_oauth_state(SECRET);
        let b = generate_oauth_state(SECRET);
        assert!(verify_oauth_state(SECRET, &a, &b).is_err());
    }

    #[test]
    fn test_oauth_state_expired() {
        let state = generate_oauth_state(SECRET);
        let far_future = Utc::now().timestamp_millis() + OAUTH_STATE_TTL_MS + 1_000;
        assert!(verify_oauth_state_at(SECRET, &state, &state, far_future).is_err());
    }
}
