//! Backup Code Value Object
//!
//! Single-use recovery codes for accounts with 2FA enabled. Codes are
//! 8-digit numerics, shown to the user exactly once at generation; only a
//! keyed hash is persisted, so a database leak does not expose usable
//! codes.
//!
//! Consumption (marking a code used and persisting that) is the sign-in
//! orchestrator's job. `locate` is a pure lookup so it can be unit-tested
//! and so racing requests are resolved by the store's conditional update,
//! not here.

use chrono::{DateTime, Utc};
use platform::cipher::SecretCipher;
use rand::Rng;

/// Number of digits per code
const CODE_DIGITS: usize = 8;

/// Default batch size for generation
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A stored backup code (hash only)
#[derive(Debug, Clone)]
pub struct BackupCodeRecord {
    /// Keyed hash of the code (hex)
    pub code_hash: String,
    /// Whether the code has been consumed
    pub used: bool,
    /// When it was consumed
    pub used_at: Option<DateTime<Utc>>,
    /// When the batch was generated
    pub created_at: DateTime<Utc>,
}

impl BackupCodeRecord {
    fn new(code_hash: String, created_at: DateTime<Utc>) -> Self {
        Self {
            code_hash,
            used: false,
            used_at: None,
            created_at,
        }
    }
}

/// Generated batch: plaintext codes for one-time display plus the records
/// to persist
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub plaintext_codes: Vec<String>,
    pub records: Vec<BackupCodeRecord>,
}

/// Generate a batch of backup codes
///
/// Returns the plaintext codes (display once, never stored) and the hashed
/// records for persistence. A regenerated batch replaces the old one
/// entirely.
pub fn generate_batch(cipher: &SecretCipher, count: usize) -> BackupCodeBatch {
    let now = Utc::now();
    let mut rng = rand::rng();

    let mut plaintext_codes = Vec::with_capacity(count);
    let mut records = Vec::with_capacity(count);

    for _ in 0..count {
        let code = format!("{:08}", rng.random_range(0..100_000_000u32));
        let hash = cipher.hash(code.as_bytes());
        records.push(BackupCodeRecord::new(hash, now));
        plaintext_codes.push(code);
    }

    BackupCodeBatch {
        plaintext_codes,
        records,
    }
}

/// Find the unused record matching a presented code
///
/// Pure lookup: hashes the input and scans for an unused record with the
/// same hash. Returns the record's index, or `None` when the code is
/// malformed, unknown, or already spent. An empty slice never matches.
pub fn locate(code: &str, cipher: &SecretCipher, records: &[BackupCodeRecord]) -> Option<usize> {
    let trimmed = code.trim();
    if trimmed.len() != CODE_DIGITS || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hash = cipher.hash(trimmed.as_bytes());
    records
        .iter()
        .position(|r| !r.used && r.code_hash == hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new([5u8; 32])
    }

    #[test]
    fn test_generate_batch_shape() {
        let batch = generate_batch(&cipher(), DEFAULT_BATCH_SIZE);
        assert_eq!(batch.plaintext_codes.len(), 10);
        assert_eq!(batch.records.len(), 10);

        for code in &batch.plaintext_codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }

        // Plaintext never appears in the stored records
        for (code, record) in batch.plaintext_codes.iter().zip(&batch.records) {
            assert_ne!(&record.code_hash, code);
            assert!(!record.used);
        }
    }

    #[test]
    fn test_locate_finds_unused() {
        let c = cipher();
        let batch = generate_batch(&c, 5);

        let idx = locate(&batch.plaintext_codes[2], &c, &batch.records);
        assert_eq!(idx, Some(2));
    }

    #[test]
    fn test_locate_skips_used() {
        let c = cipher();
        let mut batch = generate_batch(&c, 3);

        batch.records[1].used = true;
        batch.records[1].used_at = Some(Utc::now());

        assert_eq!(locate(&batch.plaintext_codes[1], &c, &batch.records), None);
        assert_eq!(
            locate(&batch.plaintext_codes[0], &c, &batch.records),
            Some(0)
        );
    }

    #[test]
    fn test_locate_rejects_malformed_and_unknown() {
        let c = cipher();
        let batch = generate_batch(&c, 3);

        assert_eq!(locate("", &c, &batch.records), None);
        assert_eq!(locate("1234", &c, &batch.records), None);
        assert_eq!(locate("abcdefgh", &c, &batch.records), None);
        // Valid shape but (almost certainly) not in the batch
        assert_eq!(locate("00000000", &c, &[]), None);
    }

    #[test]
    fn test_locate_keyed_by_cipher() {
        let c = cipher();
        let batch = generate_batch(&c, 3);

        let other = SecretCipher::new([6u8; 32]);
        assert_eq!(locate(&batch.plaintext_codes[0], &other, &batch.records), None);
    }
}
