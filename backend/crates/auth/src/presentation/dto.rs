//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

// ============================================================================
// Sign Up
// ============================================================================

/// Sign up request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Sign up response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub public_id: String,
}

// ============================================================================
// Sign In
// ============================================================================

/// Sign in request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Sign in response (fully authenticated)
///
/// When a second factor is still required the endpoint answers 428 with a
/// `challenge` field instead of this body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub public_id: String,
    pub role: String,
    pub expires_at_ms: i64,
}

// ============================================================================
// Two-Factor Verification
// ============================================================================

/// 2FA verification request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorVerifyRequest {
    /// Challenge reference from the sign-in step
    pub challenge: String,
    /// TOTP code (6 digits) or backup code (8 digits)
    pub code: String,
    /// Remember this device and skip 2FA on it next time
    #[serde(default)]
    pub trust_device: bool,
}

/// 2FA verification response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorVerifyResponse {
    pub public_id: String,
    pub role: String,
    pub expires_at_ms: i64,
    /// Unused backup codes left, present when one was spent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_codes_remaining: Option<u32>,
}

/// Current 2FA state for the settings page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
    /// A secret has been provisioned but not yet confirmed
    pub pending: bool,
    pub backup_codes_remaining: u32,
}

// ============================================================================
// Session Status / Sign Out
// ============================================================================

/// Session status response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub authenticated: bool,
    pub public_id: Option<String>,
    pub role: Option<String>,
    pub expires_at_ms: Option<i64>,
}

/// Sign out from all other sessions response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutAllResponse {
    /// Sessions invalidated (not counting the current one)
    pub revoked: u64,
}

// ============================================================================
// Anti-Forgery
// ============================================================================

/// Anti-forgery token response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub token: String,
    /// Header the token must be echoed in on unsafe requests
    pub header_name: String,
}

// ============================================================================
// TOTP Setup
// ============================================================================

/// TOTP setup response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetupResponse {
    /// QR code as base64-encoded PNG
    pub qr_code: String,
    /// Secret for manual entry (shown once)
    pub secret: String,
    /// otpauth:// URL
    pub otpauth_url: String,
}

/// TOTP confirm request (first valid code enables 2FA)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpConfirmRequest {
    pub code: String,
}

/// TOTP disable request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpDisableRequest {
    /// Current TOTP code to confirm disable
    pub code: String,
}

/// Backup code regeneration request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateBackupCodesRequest {
    /// Current TOTP code to confirm regeneration
    pub code: String,
}

/// Freshly minted backup codes (shown once)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

// ============================================================================
// Trusted Devices
// ============================================================================

/// One trusted device row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedDeviceResponse {
    pub device_id: String,
    pub display_name: String,
    pub created_at_ms: i64,
    pub last_used_at_ms: i64,
    /// Grant has outlived its TTL; it no longer skips 2FA
    pub expired: bool,
}

/// Trusted device list response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedDeviceListResponse {
    pub devices: Vec<TrustedDeviceResponse>,
}

// ============================================================================
// OAuth
// ============================================================================

/// Query parameters on the provider callback
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied the request
    pub error: Option<String>,
}

/// One connected provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConnectionResponse {
    pub provider: String,
    pub provider_display_name: String,
    pub email: String,
    pub name: Option<String>,
    pub connected_at_ms: i64,
    pub last_used_at_ms: i64,
}

/// Connected provider list response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConnectionsResponse {
    pub connections: Vec<OAuthConnectionResponse>,
}

// ============================================================================
// Login History
// ============================================================================

/// One login history event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEventResponse {
    pub success: bool,
    /// "password", "totp", "backup_code" or "oauth_{provider}"
    pub method: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at_ms: i64,
}

/// Login history response (newest first)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginHistoryResponse {
    pub events: Vec<LoginEventResponse>,
}
