//! OAuth Provider Value Objects
//!
//! Closed set of supported identity providers plus the provider-neutral
//! profile shape everything downstream of the broker works with. Adding a
//! provider means adding an enum variant; every `match` on the enum is
//! exhaustive, so the compiler walks you through the rest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Supported OAuth providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
    Vk,
}

impl OAuthProvider {
    /// All supported providers, for iteration
    pub const ALL: [OAuthProvider; 3] =
        [OAuthProvider::Google, OAuthProvider::GitHub, OAuthProvider::Vk];

    /// Stable string code (URL path segment, database column)
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
            OAuthProvider::Vk => "vk",
        }
    }

    /// Human-readable name for display
    #[inline]
    pub const fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "Google",
            OAuthProvider::GitHub => "GitHub",
            OAuthProvider::Vk => "VK",
        }
    }

    /// Parse from string code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "google" => Some(OAuthProvider::Google),
            "github" => Some(OAuthProvider::GitHub),
            "vk" => Some(OAuthProvider::Vk),
            _ => None,
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| AuthError::UnsupportedProvider(s.to_string()))
    }
}

/// Provider-neutral profile
///
/// Every provider adapter maps its response into this shape; the account
/// resolution logic never sees provider-specific payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedProfile {
    pub provider: OAuthProvider,
    /// Provider's stable user identifier (stringified)
    pub provider_id: String,
    pub email: String,
    /// Whether the provider asserts the email is verified
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_code_roundtrip() {
        for provider in OAuthProvider::ALL {
            assert_eq!(OAuthProvider::from_code(provider.code()), Some(provider));
            assert_eq!(provider.code().parse::<OAuthProvider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_unknown_provider() {
        assert_eq!(OAuthProvider::from_code("facebook"), None);
        assert!(matches!(
            "facebook".parse::<OAuthProvider>(),
            Err(AuthError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(OAuthProvider::GitHub.to_string(), "github");
        assert_eq!(OAuthProvider::GitHub.display_name(), "GitHub");
    }
}
