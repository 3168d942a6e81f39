// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Salted one-way password hashing with a tagged legacy format.
//!
//! Current records are `0x02 || params || salt[16] || Argon2id[32]`. Records
//! written by older deployments are `0x01 || salt[32] || SHA-256(salt || pw)`
//! and are only accepted when the caller allows it.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use strongbox_config::model::VaultConfig;
use strongbox_core::{HashRecord, HashVersion, KdfParams, StrongboxError};
use zeroize::Zeroizing;

use crate::kdf;
use crate::random::{RandomSource, random_bytes};

const DIGEST_LEN: usize = 32;

/// Compare two byte strings in time independent of where they differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn legacy_digest(salt: &[u8], password: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::new()
        .chain_update(salt)
        .chain_update(password)
        .finalize()
        .into()
}

/// Produces and checks [`HashRecord`]s.
#[derive(Clone)]
pub struct PasswordHasher {
    params: KdfParams,
    rng: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl PasswordHasher {
    pub fn new(params: KdfParams, rng: Arc<dyn RandomSource>) -> Self {
        Self { params, rng }
    }

    pub fn from_config(config: &VaultConfig, rng: Arc<dyn RandomSource>) -> Self {
        Self::new(kdf::params_from_config(config), rng)
    }

    /// Parameters used for new hashes.
    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Hash `password` in the current format with a fresh salt.
    ///
    /// Fails only if randomness or the KDF is unavailable.
    pub fn hash(&self, password: &[u8]) -> Result<HashRecord, StrongboxError> {
        let version = HashVersion::Argon2id;
        let salt = random_bytes(self.rng.as_ref(), version.salt_len())?;
        let mut digest = Zeroizing::new([0u8; DIGEST_LEN]);
        kdf::argon2id(password, &salt, self.params, digest.as_mut())?;

        let mut record = Vec::with_capacity(version.record_len());
        record.push(version as u8);
        record.extend_from_slice(&self.params.to_bytes());
        record.extend_from_slice(&salt);
        record.extend_from_slice(digest.as_ref());
        Ok(HashRecord::from_bytes(record))
    }

    /// Hash `password` in the legacy SHA-256 format.
    ///
    /// Only for importing records from deployments that predate Argon2id.
    pub fn hash_legacy(&self, password: &[u8]) -> Result<HashRecord, StrongboxError> {
        let version = HashVersion::LegacySha256;
        let salt = random_bytes(self.rng.as_ref(), version.salt_len())?;
        let digest = legacy_digest(&salt, password);

        let mut record = Vec::with_capacity(version.record_len());
        record.push(version as u8);
        record.extend_from_slice(&salt);
        record.extend_from_slice(&digest);
        Ok(HashRecord::from_bytes(record))
    }

    /// Check `password` against `record`.
    ///
    /// Returns `false` for a mismatch, a malformed record, or a legacy record
    /// when `legacy_allowed` is off. Never errors.
    pub fn verify(&self, password: &[u8], record: &HashRecord, legacy_allowed: bool) -> bool {
        let (Some(version), Some(salt), Some(stored)) =
            (record.version(), record.salt(), record.digest())
        else {
            return false;
        };

        match version {
            HashVersion::LegacySha256 => {
                legacy_allowed && constant_time_eq(&legacy_digest(salt, password), stored)
            }
            HashVersion::Argon2id => {
                let Some(params) = record.kdf_params() else {
                    return false;
                };
                let mut digest = Zeroizing::new([0u8; DIGEST_LEN]);
                if kdf::argon2id(password, salt, params, digest.as_mut()).is_err() {
                    return false;
                }
                constant_time_eq(digest.as_ref(), stored)
            }
        }
    }

    /// Whether a record that just verified should be rewritten in the current format.
    pub fn needs_upgrade(&self, record: &HashRecord) -> bool {
        record.is_legacy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SystemRandomSource;
    use crate::random::testing::FailingRandom;

    fn cheap() -> KdfParams {
        KdfParams {
            memory_cost: 32768,
            iterations: 2,
            parallelism: 1,
        }
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(cheap(), Arc::new(SystemRandomSource::new()))
    }

    #[test]
    fn hash_then_verify() {
        let h = hasher();
        let record = h.hash(b"open sesame").unwrap();
        assert_eq!(record.version(), Some(HashVersion::Argon2id));
        assert!(h.verify(b"open sesame", &record, false));
        assert!(!h.verify(b"open sesame!", &record, false));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let h = hasher();
        let a = h.hash(b"repeat").unwrap();
        let b = h.hash(b"repeat").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a, b);
    }

    #[test]
    fn record_verifies_after_parameters_change() {
        let record = hasher().hash(b"portable").unwrap();
        let stronger = PasswordHasher::new(
            KdfParams {
                iterations: 3,
                ..cheap()
            },
            Arc::new(SystemRandomSource::new()),
        );
        assert!(stronger.verify(b"portable", &record, false));
    }

    #[test]
    fn malformed_records_never_match() {
        let h = hasher();
        let good = h.hash(b"pw").unwrap();
        let mut truncated = good.as_bytes().to_vec();
        truncated.pop();
        let mut retagged = good.as_bytes().to_vec();
        retagged[0] = 0x09;

        assert!(!h.verify(b"pw", &HashRecord::from_bytes(Vec::new()), true));
        assert!(!h.verify(b"pw", &HashRecord::from_bytes(truncated), true));
        assert!(!h.verify(b"pw", &HashRecord::from_bytes(retagged), true));
    }

    #[test]
    fn unusable_parameters_in_record_are_a_mismatch() {
        let h = hasher();
        let mut bytes = h.hash(b"pw").unwrap().as_bytes().to_vec();
        bytes[1..13].copy_from_slice(&[0u8; 12]);
        assert!(!h.verify(b"pw", &HashRecord::from_bytes(bytes), true));
    }

    #[test]
    fn legacy_records_require_permission() {
        let h = hasher();
        let legacy = h.hash_legacy(b"old school").unwrap();
        assert!(legacy.is_legacy());
        assert!(h.needs_upgrade(&legacy));
        assert!(h.verify(b"old school", &legacy, true));
        assert!(!h.verify(b"old school", &legacy, false));
        assert!(!h.verify(b"new school", &legacy, true));
    }

    #[test]
    fn current_records_need_no_upgrade() {
        let h = hasher();
        assert!(!h.needs_upgrade(&h.hash(b"x").unwrap()));
    }

    #[test]
    fn hash_fails_when_randomness_is_exhausted() {
        let h = PasswordHasher::new(cheap(), Arc::new(FailingRandom));
        assert!(matches!(h.hash(b"pw"), Err(StrongboxError::Randomness)));
        assert!(matches!(h.hash_legacy(b"pw"), Err(StrongboxError::Randomness)));
    }

    #[test]
    fn constant_time_eq_compares_full_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
