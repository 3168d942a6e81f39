// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographically secure random bytes for IVs, salts and ephemeral secrets.

use ring::rand::{SecureRandom, SystemRandom};
use strongbox_core::StrongboxError;

/// A source of cryptographically secure random bytes.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely or fail with [`StrongboxError::Randomness`].
    fn fill(&self, dest: &mut [u8]) -> Result<(), StrongboxError>;
}

/// The operating system CSPRNG, via ring.
#[derive(Debug)]
pub struct SystemRandomSource {
    rng: SystemRandom,
}

impl SystemRandomSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), StrongboxError> {
        self.rng.fill(dest).map_err(|_| StrongboxError::Randomness)
    }
}

/// Draw `len` random bytes.
pub fn random_bytes(source: &dyn RandomSource, len: usize) -> Result<Vec<u8>, StrongboxError> {
    let mut out = vec![0u8; len];
    source.fill(&mut out)?;
    Ok(out)
}

/// Draw a fixed-size random array.
pub fn random_array<const N: usize>(source: &dyn RandomSource) -> Result<[u8; N], StrongboxError> {
    let mut out = [0u8; N];
    source.fill(&mut out)?;
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_draws_differ() {
        let rng = SystemRandomSource::new();
        let a: [u8; 32] = random_array(&rng).unwrap();
        let b: [u8; 32] = random_array(&rng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn random_bytes_has_requested_length() {
        let rng = SystemRandomSource::new();
        assert_eq!(random_bytes(&rng, 0).unwrap().len(), 0);
        assert_eq!(random_bytes(&rng, 77).unwrap().len(), 77);
    }

    #[test]
    fn failure_surfaces_as_randomness_error() {
        let err = random_bytes(&testing::FailingRandom, 16).unwrap_err();
        assert!(matches!(err, StrongboxError::Randomness));
    }
}
