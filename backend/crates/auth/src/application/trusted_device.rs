//! Trusted Device Management Use Case
//!
//! Listing and revoking the devices an account has asked to remember.
//! Granting trust happens in the 2FA verification flow, not here.

use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::domain::repository::TrustedDeviceRepository;
use crate::domain::value_object::account_id::AccountId;
use crate::error::{AuthError, AuthResult};

/// One device row for the settings page
pub struct TrustedDeviceView {
    /// Opaque token; also the revocation handle
    pub device_id: String,
    pub display_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used_at: chrono::DateTime<chrono::Utc>,
    /// Grant has outlived its TTL; it no longer skips 2FA
    pub expired: bool,
}

/// Trusted device management use case
pub struct TrustedDeviceUseCase<D>
where
    D: TrustedDeviceRepository,
{
    device_repo: Arc<D>,
    config: Arc<AuthConfig>,
}

impl<D> TrustedDeviceUseCase<D>
where
    D: TrustedDeviceRepository,
{
    pub fn new(device_repo: Arc<D>, config: Arc<AuthConfig>) -> Self {
        Self {
            device_repo,
            config,
        }
    }

    /// List all devices, newest first, expired ones flagged
    pub async fn list(&self, account_id: &AccountId) -> AuthResult<Vec<TrustedDeviceView>> {
        let ttl = self.config.trusted_device_ttl_chrono();
        let devices = self.device_repo.find_all(account_id).await?;

        Ok(devices
            .into_iter()
            .map(|d| TrustedDeviceView {
                expired: d.is_expired(ttl),
                device_id: d.device_id,
                display_name: d.display_name,
                created_at: d.created_at,
                last_used_at: d.last_used_at,
            })
            .collect())
    }

    /// Revoke one device
    pub async fn revoke(&self, account_id: &AccountId, device_id: &str) -> AuthResult<()> {
        let removed = self.device_repo.revoke(account_id, device_id).await?;
        if !removed {
            return Err(AuthError::Validation("Unknown device".to_string()));
        }

        tracing::info!(account_id = %account_id, "Trusted device revoked");
        Ok(())
    }
}
