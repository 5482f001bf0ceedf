//! Secret Cipher - authenticated encryption for stored secrets
//!
//! Symmetric encryption of sensitive fields (TOTP secrets) with
//! AES-256-GCM. Keys are derived per purpose from a single master key via
//! HMAC-SHA256, so compromise of one derived key does not expose fields
//! encrypted under another purpose.
//!
//! The cipher is an explicitly constructed value, passed to call sites.
//! There is no process-global instance.
//!
//! ## Envelope format
//! `iv:tag:ciphertext`, each part hex-encoded. The IV (nonce) is 12 bytes,
//! the GCM tag 16 bytes.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::hmac_sha256;

/// GCM nonce length in bytes
const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Secret cipher errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Encryption failed (should not happen for reasonable inputs)
    #[error("Encryption failed")]
    Encryption,

    /// Authentication tag did not verify, or the key/purpose is wrong
    #[error("Decryption failed: ciphertext rejected")]
    Decryption,

    /// Envelope is not `iv:tag:ciphertext` hex
    #[error("Malformed ciphertext envelope")]
    MalformedEnvelope,

    /// Decrypted bytes were not valid UTF-8
    #[error("Decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Authenticated encryption service keyed by purpose strings
///
/// ## Examples
/// ```rust
/// use platform::cipher::SecretCipher;
///
/// let cipher = SecretCipher::new([7u8; 32]);
/// let envelope = cipher.encrypt_str("JBSWY3DPEHPK3PXP", "totp").unwrap();
/// let plain = cipher.decrypt_str(&envelope, "totp").unwrap();
/// assert_eq!(plain, "JBSWY3DPEHPK3PXP");
/// ```
#[derive(Clone)]
pub struct SecretCipher {
    master_key: [u8; 32],
}

impl SecretCipher {
    /// Create a cipher from a 32-byte master key
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// Create a cipher with a random master key (for development/tests)
    pub fn with_random_key() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Derive the per-purpose encryption key
    fn derive_key(&self, purpose: &str) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(hmac_sha256(&self.master_key, purpose.as_bytes()))
    }

    /// Encrypt plaintext bytes under the given purpose
    ///
    /// Returns the `iv:tag:ciphertext` hex envelope.
    pub fn encrypt(&self, plaintext: &[u8], purpose: &str) -> Result<String, CipherError> {
        let key = self.derive_key(purpose);
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext; split it back out
        // to keep the iv:tag:ciphertext envelope layout.
        let mut sealed = aead
            .encrypt(nonce, Payload::from(plaintext))
            .map_err(|_| CipherError::Encryption)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }

    /// Encrypt a UTF-8 string under the given purpose
    pub fn encrypt_str(&self, plaintext: &str, purpose: &str) -> Result<String, CipherError> {
        self.encrypt(plaintext.as_bytes(), purpose)
    }

    /// Decrypt an `iv:tag:ciphertext` envelope
    ///
    /// Fails with [`CipherError::Decryption`] when the authentication tag
    /// does not verify (tampering, or wrong purpose/key).
    pub fn decrypt(&self, envelope: &str, purpose: &str) -> Result<Vec<u8>, CipherError> {
        let mut parts = envelope.split(':');
        let (iv_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(iv), Some(tag), Some(ct), None) => (iv, tag, ct),
            _ => return Err(CipherError::MalformedEnvelope),
        };

        let nonce_bytes = hex::decode(iv_hex).map_err(|_| CipherError::MalformedEnvelope)?;
        let tag = hex::decode(tag_hex).map_err(|_| CipherError::MalformedEnvelope)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| CipherError::MalformedEnvelope)?;

        if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(CipherError::MalformedEnvelope);
        }

        let key = self.derive_key(purpose);
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        aead.decrypt(Nonce::from_slice(&nonce_bytes), Payload::from(sealed.as_ref()))
            .map_err(|_| CipherError::Decryption)
    }

    /// Decrypt an envelope into a UTF-8 string
    pub fn decrypt_str(&self, envelope: &str, purpose: &str) -> Result<String, CipherError> {
        let bytes = self.decrypt(envelope, purpose)?;
        String::from_utf8(bytes).map_err(|_| CipherError::InvalidUtf8)
    }

    /// One-way hash keyed by the master secret, hex-encoded
    ///
    /// For irreversible storage (backup codes). Not reversible even with
    /// the ciphertext envelope format.
    pub fn hash(&self, data: &[u8]) -> String {
        hex::encode(hmac_sha256(&self.master_key, data))
    }
}

/// Mask sensitive data for logging: first `visible` chars, then asterisks
///
/// Display-only. Never use the masked form for security decisions.
pub fn mask(data: &str, visible: usize) -> String {
    let shown: String = data.chars().take(visible).collect();
    let hidden = data.chars().count().saturating_sub(visible);
    format!("{}{}", shown, "*".repeat(hidden))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new([42u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let c = cipher();
        let envelope = c.encrypt_str("super secret value", "totp").unwrap();
        assert_eq!(envelope.split(':').count(), 3);

        let plain = c.decrypt_str(&envelope, "totp").unwrap();
        assert_eq!(plain, "super secret value");
    }

    #[test]
    fn test_purpose_separation() {
        let c = cipher();
        let envelope = c.encrypt_str("payload", "totp").unwrap();

        // Same master key, different purpose: must not decrypt
        assert_eq!(
            c.decrypt_str(&envelope, "session"),
            Err(CipherError::Decryption)
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let envelope = cipher().encrypt_str("payload", "totp").unwrap();
        let other = SecretCipher::new([43u8; 32]);
        assert_eq!(
            other.decrypt_str(&envelope, "totp"),
            Err(CipherError::Decryption)
        );
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let c = cipher();
        let envelope = c.encrypt_str("payload", "totp").unwrap();

        // Flip one hex digit of the ciphertext part
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        let last = parts[2].pop().unwrap();
        parts[2].push(if last == '0' { '1' } else { '0' });
        let tampered = parts.join(":");

        assert_eq!(
            c.decrypt_str(&tampered, "totp"),
            Err(CipherError::Decryption)
        );
    }

    #[test]
    fn test_malformed_envelope() {
        let c = cipher();
        assert_eq!(
            c.decrypt_str("not-an-envelope", "totp"),
            Err(CipherError::MalformedEnvelope)
        );
        assert_eq!(
            c.decrypt_str("aa:bb", "totp"),
            Err(CipherError::MalformedEnvelope)
        );
        assert_eq!(
            c.decrypt_str("zz:zz:zz", "totp"),
            Err(CipherError::MalformedEnvelope)
        );
    }

    #[test]
    fn test_nonce_uniqueness() {
        let c = cipher();
        let a = c.encrypt_str("same plaintext", "totp").unwrap();
        let b = c.encrypt_str("same plaintext", "totp").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic_and_keyed() {
        let c = cipher();
        assert_eq!(c.hash(b"12345678"), c.hash(b"12345678"));
        assert_ne!(c.hash(b"12345678"), c.hash(b"12345679"));

        let other = SecretCipher::new([1u8; 32]);
        assert_ne!(c.hash(b"12345678"), other.hash(b"12345678"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("JBSWY3DPEHPK3PXP", 4), "JBSW************");
        assert_eq!(mask("ab", 4), "ab");
        assert_eq!(mask("", 4), "");
    }
}
