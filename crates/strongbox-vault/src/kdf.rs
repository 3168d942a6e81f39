// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation from a human-supplied secret.
//!
//! Derives a 32-byte key using Argon2id (Algorithm::Argon2id, Version::V0x13).
//! A key salt is self-describing: `params[12] || random[16]`, so the cost
//! parameters travel with every salt and a config change never orphans an
//! existing wrap.

use strongbox_config::model::VaultConfig;
use strongbox_core::{KdfParams, StrongboxError};
use zeroize::Zeroizing;

use crate::random::{RandomSource, random_array};

/// Length of the derived key (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of the random part of a salt.
pub const SALT_LEN: usize = 16;

/// Total length of an encoded key salt.
pub const KEY_SALT_LEN: usize = KdfParams::ENCODED_LEN + SALT_LEN;

/// The Argon2id parameters configured for newly generated salts and hashes.
pub fn params_from_config(config: &VaultConfig) -> KdfParams {
    KdfParams {
        memory_cost: config.kdf_memory_cost,
        iterations: config.kdf_iterations,
        parallelism: config.kdf_parallelism,
    }
}

/// Run Argon2id over `secret` and `salt`, filling `output`.
pub fn argon2id(
    secret: &[u8],
    salt: &[u8],
    params: KdfParams,
    output: &mut [u8],
) -> Result<(), StrongboxError> {
    let argon_params = argon2::Params::new(
        params.memory_cost,
        params.iterations,
        params.parallelism,
        Some(output.len()),
    )
    .map_err(|e| StrongboxError::Internal(format!("invalid Argon2id parameters: {e}")))?;

    argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params)
        .hash_password_into(secret, salt, output)
        .map_err(|e| StrongboxError::Internal(format!("Argon2id key derivation failed: {e}")))
}

/// Generate a fresh key salt carrying `params`.
pub fn new_key_salt(
    rng: &dyn RandomSource,
    params: KdfParams,
) -> Result<Vec<u8>, StrongboxError> {
    let random: [u8; SALT_LEN] = random_array(rng)?;
    let mut salt = Vec::with_capacity(KEY_SALT_LEN);
    salt.extend_from_slice(&params.to_bytes());
    salt.extend_from_slice(&random);
    Ok(salt)
}

/// Split a key salt into its parameters and random part.
pub fn parse_key_salt(key_salt: &[u8]) -> Option<(KdfParams, &[u8])> {
    if key_salt.len() != KEY_SALT_LEN {
        return None;
    }
    let (params, random) = key_salt.split_at(KdfParams::ENCODED_LEN);
    Some((KdfParams::from_bytes(params)?, random))
}

/// Derive a 32-byte key from `secret` and an encoded key salt.
///
/// Deterministic: the same secret and salt always give the same key.
pub fn derive_key(
    secret: &[u8],
    key_salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, StrongboxError> {
    let (params, salt) = parse_key_salt(key_salt)
        .ok_or_else(|| StrongboxError::Internal("malformed key salt".to_string()))?;
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2id(secret, salt, params, output.as_mut())?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SystemRandomSource;

    fn cheap() -> KdfParams {
        KdfParams {
            memory_cost: 32768,
            iterations: 2,
            parallelism: 1,
        }
    }

    #[test]
    fn derive_key_is_deterministic() {
        let salt = new_key_salt(&SystemRandomSource::new(), cheap()).unwrap();
        let key1 = derive_key(b"test passphrase", &salt).unwrap();
        let key2 = derive_key(b"test passphrase", &salt).unwrap();
        assert_eq!(*key1, *key2);
    }

    #[test]
    fn different_secret_or_salt_gives_different_key() {
        let rng = SystemRandomSource::new();
        let salt_a = new_key_salt(&rng, cheap()).unwrap();
        let salt_b = new_key_salt(&rng, cheap()).unwrap();

        let base = derive_key(b"same passphrase", &salt_a).unwrap();
        assert_ne!(*base, *derive_key(b"other passphrase", &salt_a).unwrap());
        assert_ne!(*base, *derive_key(b"same passphrase", &salt_b).unwrap());
    }

    #[test]
    fn salt_carries_its_parameters() {
        let salt = new_key_salt(&SystemRandomSource::new(), cheap()).unwrap();
        assert_eq!(salt.len(), KEY_SALT_LEN);
        let (params, random) = parse_key_salt(&salt).unwrap();
        assert_eq!(params, cheap());
        assert_eq!(random.len(), SALT_LEN);
    }

    #[test]
    fn parameters_change_the_key() {
        let random = [5u8; SALT_LEN];
        let mut salt_a = cheap().to_bytes().to_vec();
        salt_a.extend_from_slice(&random);
        let mut salt_b = KdfParams {
            iterations: 3,
            ..cheap()
        }
        .to_bytes()
        .to_vec();
        salt_b.extend_from_slice(&random);

        assert_ne!(
            *derive_key(b"secret", &salt_a).unwrap(),
            *derive_key(b"secret", &salt_b).unwrap()
        );
    }

    #[test]
    fn malformed_salt_is_rejected() {
        assert!(derive_key(b"secret", &[0u8; 16]).is_err());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut salt = KdfParams {
            memory_cost: 1,
            iterations: 0,
            parallelism: 0,
        }
        .to_bytes()
        .to_vec();
        salt.extend_from_slice(&[0u8; SALT_LEN]);
        assert!(matches!(
            derive_key(b"secret", &salt),
            Err(StrongboxError::Internal(_))
        ));
    }
}
