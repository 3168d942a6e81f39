// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Strongbox key-management core.
//!
//! The first five variants are the cryptographic taxonomy every caller must be
//! able to distinguish. The rest cover the ambient machinery around them
//! (storage, configuration, randomness).

use thiserror::Error;

/// The generic text shown to a user for any failed secret check.
///
/// Hash mismatch, escrow expiry and attempt exhaustion all surface as this one
/// message so the caller cannot tell which check rejected the input.
pub const GENERIC_AUTH_FAILURE: &str = "incorrect password";

/// The primary error type used across all Strongbox crates.
#[derive(Debug, Error)]
pub enum StrongboxError {
    /// The block cipher failed its startup self-test. Fatal.
    #[error("cipher unavailable: {0}")]
    CipherUnavailable(String),

    /// Malformed ciphertext or IV, or the wrong key. Recoverable by the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A password or ephemeral escrow secret did not match.
    #[error("invalid candidate secret")]
    InvalidCandidate,

    /// The escrow (or a per-user wrap) outlived its lifetime or attempt budget.
    #[error("escrow expired or exhausted")]
    Expired,

    /// RSA key material could not be read. Fatal configuration error.
    #[error("key material missing: {path}")]
    KeyMaterialMissing { path: String },

    /// No master password has been set for this deployment yet.
    #[error("master password not set")]
    NotInitialized,

    /// A master password already exists; `set` only runs once.
    #[error("master password already set")]
    AlreadyInitialized,

    /// A concurrent writer changed the row between read and write.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// The system random number generator failed.
    #[error("randomness source failed")]
    Randomness,

    /// RSA transport errors other than a bad ciphertext (key generation, file I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration errors (invalid values, unusable paths).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrongboxError {
    /// Text safe to show to the end user.
    ///
    /// Verification failures collapse to [`GENERIC_AUTH_FAILURE`]; everything
    /// else uses the `Display` form.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCandidate | Self::Expired => GENERIC_AUTH_FAILURE.to_string(),
            Self::DecryptionFailed => "unable to decrypt this item".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the caller can continue after this error.
    ///
    /// Fatal errors indicate a broken deployment (cipher, key files, storage)
    /// rather than bad input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DecryptionFailed
                | Self::InvalidCandidate
                | Self::Expired
                | Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::Conflict(_)
        )
    }

    /// Wrap any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_share_one_user_message() {
        assert_eq!(StrongboxError::InvalidCandidate.user_message(), GENERIC_AUTH_FAILURE);
        assert_eq!(StrongboxError::Expired.user_message(), GENERIC_AUTH_FAILURE);
        assert_ne!(StrongboxError::DecryptionFailed.user_message(), GENERIC_AUTH_FAILURE);
    }

    #[test]
    fn fatal_errors_are_not_recoverable() {
        assert!(!StrongboxError::CipherUnavailable("self-test".into()).is_recoverable());
        assert!(
            !StrongboxError::KeyMaterialMissing {
                path: "/etc/strongbox/keys/key.pem".into()
            }
            .is_recoverable()
        );
        assert!(!StrongboxError::storage(std::io::Error::other("disk")).is_recoverable());
    }

    #[test]
    fn input_errors_are_recoverable() {
        assert!(StrongboxError::DecryptionFailed.is_recoverable());
        assert!(StrongboxError::InvalidCandidate.is_recoverable());
        assert!(StrongboxError::Expired.is_recoverable());
    }

    #[test]
    fn display_never_echoes_secret_material() {
        let msg = StrongboxError::InvalidCandidate.to_string();
        assert_eq!(msg, "invalid candidate secret");
    }
}
