//! TOTP Secret Value Object
//!
//! Wraps a TOTP secret for two-factor authentication, encrypted at rest.
//! The plaintext base32 secret only exists transiently: once at setup for
//! display/QR, and inside `verify` while checking a code.
//!
//! Uses Google Authenticator compatible settings: SHA-1, 6 digits, 30 s
//! step, one step of clock skew in both directions.

use platform::cipher::SecretCipher;
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{AuthError, AuthResult};

/// TOTP configuration constants
const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
const TOTP_SKEW: u8 = 1;

/// Cipher purpose under which secrets are encrypted
const ENCRYPTION_PURPOSE: &str = "totp";

/// TOTP secret, stored as an encrypted envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpSecret {
    /// Encrypted base32 secret (cipher envelope, safe to persist)
    encrypted: String,
}

impl TotpSecret {
    /// Generate a new random TOTP secret
    ///
    /// Returns the storable (encrypted) value together with the plaintext
    /// base32 secret for one-time display to the user.
    pub fn generate(cipher: &SecretCipher) -> AuthResult<(Self, String)> {
        let secret = Secret::generate_secret();
        let base32 = secret.to_encoded().to_string();
        let encrypted = cipher
            .encrypt_str(&base32, ENCRYPTION_PURPOSE)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok((Self { encrypted }, base32))
    }

    /// Create from the encrypted envelope (from database)
    pub fn from_encrypted(envelope: impl Into<String>) -> Self {
        Self {
            encrypted: envelope.into(),
        }
    }

    /// Get the encrypted envelope for storage
    pub fn as_encrypted(&self) -> &str {
        &self.encrypted
    }

    /// Decrypt and build a TOTP instance for this secret
    ///
    /// A failed decryption means the stored envelope is corrupt or the
    /// master key changed; that is surfaced as [`AuthError::Decryption`],
    /// never as a wrong code.
    fn to_totp(&self, cipher: &SecretCipher, issuer: &str, account_name: &str) -> AuthResult<TOTP> {
        let base32 = cipher
            .decrypt_str(&self.encrypted, ENCRYPTION_PURPOSE)
            .map_err(|_| AuthError::Decryption)?;

        let secret_bytes = Secret::Encoded(base32)
            .to_bytes()
            .map_err(|_| AuthError::Decryption)?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(issuer.to_string()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to create TOTP: {}", e)))
    }

    /// Verify a TOTP code against the current time
    ///
    /// Malformed input (wrong length, non-digits) verifies as `false`.
    pub fn verify(
        &self,
        code: &str,
        cipher: &SecretCipher,
        issuer: &str,
        account_name: &str,
    ) -> AuthResult<bool> {
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.to_totp(cipher, issuer, account_name)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Verify a TOTP code at an explicit Unix timestamp (for testing the
    /// acceptance window without waiting on the wall clock)
    #[cfg(test)]
    pub fn verify_at(
        &self,
        code: &str,
        timestamp: u64,
        cipher: &SecretCipher,
        issuer: &str,
        account_name: &str,
    ) -> AuthResult<bool> {
        let totp = self.to_totp(cipher, issuer, account_name)?;
        Ok(totp.check(code, timestamp))
    }

    /// Generate the code for an explicit timestamp (for testing)
    #[cfg(test)]
    pub fn generate_at(
        &self,
        timestamp: u64,
        cipher: &SecretCipher,
        issuer: &str,
        account_name: &str,
    ) -> AuthResult<String> {
        let totp = self.to_totp(cipher, issuer, account_name)?;
        Ok(totp.generate(timestamp))
    }

    /// Generate QR code as base64-encoded PNG
    pub fn qr_code_base64(
        &self,
        cipher: &SecretCipher,
        issuer: &str,
        account_name: &str,
    ) -> AuthResult<String> {
        let totp = self.to_totp(cipher, issuer, account_name)?;
        totp.get_qr_base64()
            .map_err(|e| AuthError::Internal(format!("Failed to generate QR code: {}", e)))
    }

    /// Get the otpauth:// URL for manual entry
    pub fn otpauth_url(
        &self,
        cipher: &SecretCipher,
        issuer: &str,
        account_name: &str,
    ) -> AuthResult<String> {
        let totp = self.to_totp(cipher, issuer, account_name)?;
        Ok(totp.get_url())
    }
}
