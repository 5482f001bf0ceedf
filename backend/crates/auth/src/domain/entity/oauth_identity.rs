//! OAuth Identity Entity
//!
//! A link between an account and an external provider identity.
//! `(provider, provider_id)` is unique across all accounts; the profile
//! fields are a display snapshot refreshed on every OAuth sign-in.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::value_object::{
    account_id::AccountId,
    oauth_provider::{NormalizedProfile, OAuthProvider},
};

/// OAuth identity link entity
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    /// Link identifier
    pub id: Uuid,
    /// Owning account
    pub account_id: AccountId,
    /// Identity provider
    pub provider: OAuthProvider,
    /// Provider's stable user identifier
    pub provider_id: String,
    /// Email as reported by the provider
    pub email: String,
    /// Display name snapshot
    pub name: Option<String>,
    /// Avatar snapshot
    pub avatar_url: Option<String>,
    /// Link to the provider-side profile page
    pub profile_url: Option<String>,
    /// When the link was created
    pub created_at: DateTime<Utc>,
    /// Last OAuth sign-in through this link
    pub last_used_at: DateTime<Utc>,
}

impl OAuthIdentity {
    /// Create a link from a normalized profile
    pub fn from_profile(account_id: AccountId, profile: &NormalizedProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            provider: profile.provider,
            provider_id: profile.provider_id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
            profile_url: profile.profile_url.clone(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Refresh the display snapshot and usage time from a fresh profile
    pub fn refresh_snapshot(&mut self, profile: &NormalizedProfile) {
        self.email = profile.email.clone();
        self.name = profile.name.clone();
        self.avatar_url = profile.avatar_url.clone();
        self.profile_url = profile.profile_url.clone();
        self.last_used_at = Utc::now();
    }
}
