//! CSRF Guard - anti-forgery token issuance and validation
//!
//! Tokens are time-boxed and bound to a session key:
//! `"{timestamp_ms}.{hex HMAC-SHA256(secret, session_key:timestamp_ms)}"`.
//!
//! The session key should be a stable per-session identifier. Falling back
//! to the client IP is supported when no session exists yet, but is weaker
//! (shared NATs, rotating addresses) and should be treated as optional
//! hardening, not a substitute for session binding.
//!
//! Origin/Referer checking is independent of token validation: absent
//! headers are tolerated (not every client sends them), but a present,
//! mismatched header is rejected.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::{constant_time_eq, hmac_sha256};

/// Default token lifetime: 1 hour
pub const DEFAULT_TOKEN_TTL_MS: i64 = 3_600_000;

/// HTTP methods that do not require a CSRF token
pub const SAFE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];

/// Anti-forgery token service
///
/// Explicitly constructed with its secret; no ambient state.
#[derive(Clone)]
pub struct CsrfGuard {
    secret: [u8; 32],
    token_ttl_ms: i64,
}

impl CsrfGuard {
    /// Create a guard with the default 1-hour token lifetime
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret,
            token_ttl_ms: DEFAULT_TOKEN_TTL_MS,
        }
    }

    /// Create a guard with a custom token lifetime
    pub fn with_ttl_ms(secret: [u8; 32], token_ttl_ms: i64) -> Self {
        Self {
            secret,
            token_ttl_ms,
        }
    }

    /// Token lifetime in seconds (for cookie Max-Age)
    pub fn token_ttl_secs(&self) -> i64 {
        self.token_ttl_ms / 1000
    }

    /// Issue a token bound to the given session key
    pub fn generate_token(&self, session_key: &str) -> String {
        self.generate_token_at(session_key, now_ms())
    }

    /// Validate a token against the session key it should be bound to
    ///
    /// Rejects expired tokens (older than the configured lifetime),
    /// malformed tokens, and signature mismatches. The signature check is
    /// constant-time.
    pub fn validate_token(&self, token: &str, session_key: &str) -> bool {
        self.validate_token_at(token, session_key, now_ms())
    }

    /// Whether the given HTTP method requires a token
    pub fn method_requires_token(method: &str) -> bool {
        !SAFE_METHODS.contains(&method.to_ascii_uppercase().as_str())
    }

    fn generate_token_at(&self, session_key: &str, now_ms: i64) -> String {
        let sig = self.sign(session_key, now_ms);
        format!("{}.{}", now_ms, hex::encode(sig))
    }

    fn validate_token_at(&self, token: &str, session_key: &str, now_ms: i64) -> bool {
        let Some((ts_str, sig_hex)) = token.split_once('.') else {
            return false;
        };
        let Ok(issued_ms) = ts_str.parse::<i64>() else {
            return false;
        };

        // Expired, or claims to be from the future
        let age_ms = now_ms - issued_ms;
        if age_ms > self.token_ttl_ms || age_ms < 0 {
            return false;
        }

        let Ok(presented) = hex::decode(sig_hex) else {
            return false;
        };

        let expected = self.sign(session_key, issued_ms);
        constant_time_eq(&presented, &expected)
    }

    fn sign(&self, session_key: &str, timestamp_ms: i64) -> [u8; 32] {
        let material = format!("{}:{}", session_key, timestamp_ms);
        hmac_sha256(&self.secret, material.as_bytes())
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Origin / Referer checking
// ============================================================================

/// Allow-list based Origin/Referer policy
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    /// Allowed origins, e.g. `https://shop.example.com`
    allowed_origins: Vec<String>,
    /// When false, the check always passes (non-hardened deployments)
    enforce: bool,
}

impl OriginPolicy {
    /// Create an enforcing policy from an allow-list
    pub fn enforcing(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins,
            enforce: true,
        }
    }

    /// Create a policy that accepts everything
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Check request headers against the allow-list
    ///
    /// Absent headers pass; a present header must match an allowed origin.
    /// Referer values are matched by origin prefix.
    pub fn check(&self, origin: Option<&str>, referer: Option<&str>) -> bool {
        if !self.enforce {
            return true;
        }

        if let Some(origin) = origin {
            return self.allowed_origins.iter().any(|a| a == origin);
        }

        if let Some(referer) = referer {
            return self
                .allowed_origins
                .iter()
                .any(|a| referer.starts_with(a.as_str()));
        }

        // Neither header present: tolerated
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new([9u8; 32])
    }

    #[test]
    fn test_generate_and_validate() {
        let g = guard();
        let token = g.generate_token("session-abc");
        assert!(g.validate_token(&token, "session-abc"));
    }

    #[test]
    fn test_session_binding() {
        let g = guard();
        let token = g.generate_token("session-a");
        assert!(!g.validate_token(&token, "session-b"));
    }

    #[test]
    fn test_expiry_window() {
        let g = guard();
        let issued = 1_700_000_000_000i64;
        let token = g.generate_token_at("sess", issued);

        // 59 minutes later: still valid
        assert!(g.validate_token_at(&token, "sess", issued + 59 * 60 * 1000));
        // 61 minutes later: expired
        assert!(!g.validate_token_at(&token, "sess", issued + 61 * 60 * 1000));
    }

    #[test]
    fn test_future_token_rejected() {
        let g = guard();
        let issued = 1_700_000_000_000i64;
        let token = g.generate_token_at("sess", issued);
        assert!(!g.validate_token_at(&token, "sess", issued - 5_000));
    }

    #[test]
    fn test_malformed_tokens() {
        let g = guard();
        assert!(!g.validate_token("", "sess"));
        assert!(!g.validate_token("no-dot-here", "sess"));
        assert!(!g.validate_token("notanumber.abcdef", "sess"));
        assert!(!g.validate_token("12345.zzzz", "sess"));
    }

    #[test]
    fn test_secret_separation() {
        let token = guard().generate_token("sess");
        let other = CsrfGuard::new([10u8; 32]);
        assert!(!other.validate_token(&token, "sess"));
    }

    #[test]
    fn test_method_requires_token() {
        assert!(!CsrfGuard::method_requires_token("GET"));
        assert!(!CsrfGuard::method_requires_token("head"));
        assert!(!CsrfGuard::method_requires_token("OPTIONS"));
        assert!(CsrfGuard::method_requires_token("POST"));
        assert!(CsrfGuard::method_requires_token("DELETE"));
        assert!(CsrfGuard::method_requires_token("PATCH"));
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::enforcing(vec!["https://shop.example.com".to_string()]);

        // Absent headers tolerated
        assert!(policy.check(None, None));

        // Matching origin
        assert!(policy.check(Some("https://shop.example.com"), None));
        // Mismatched origin rejected
        assert!(!policy.check(Some("https://evil.example.com"), None));

        // Referer matched by prefix
        assert!(policy.check(None, Some("https://shop.example.com/cart")));
        assert!(!policy.check(None, Some("https://evil.example.com/cart")));

        // Permissive mode passes everything
        assert!(OriginPolicy::permissive().check(Some("https://evil.example.com"), None));
    }
}
