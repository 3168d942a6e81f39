// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-boxed, attempt-limited escrow of a previous master key.
//!
//! During a master password change the old key is wrapped under a key derived
//! from a random ephemeral secret. Whoever holds that secret can recover the
//! old key until the escrow expires or [`MAX_ESCROW_ATTEMPTS`] wrong guesses
//! have been made. An attempt is reserved in storage before the secret is
//! checked, so concurrent guesses cannot exceed the limit. Only failures keep
//! their reservation; a successful recovery leaves the counter unchanged.
//!
//! Every write after the initial load names the escrow by its `issued_at`, so
//! an escrow installed concurrently by a newer password change is never
//! charged or destroyed on behalf of the one that was read.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use strongbox_config::model::EscrowConfig;
use strongbox_core::{EscrowRecord, EscrowStatus, KeyStore, StrongboxError};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::cipher::CipherContext;
use crate::hasher::PasswordHasher;
use crate::kdf;
use crate::random::random_array;
use crate::session::SessionKeyHandle;

/// Failed recoveries after which the escrow is destroyed.
pub const MAX_ESCROW_ATTEMPTS: u32 = 50;

/// Random bytes in an ephemeral secret (hex encoded for the user).
const ESCROW_SECRET_BYTES: usize = 32;

/// Issues and redeems the escrow held in a [`KeyStore`].
#[derive(Clone)]
pub struct TemporaryKeyEscrow {
    store: Arc<dyn KeyStore>,
    cipher: CipherContext,
    hasher: PasswordHasher,
    max_lifetime: Duration,
}

impl TemporaryKeyEscrow {
    pub fn new(
        store: Arc<dyn KeyStore>,
        cipher: CipherContext,
        hasher: PasswordHasher,
        config: &EscrowConfig,
    ) -> Self {
        let secs = i64::try_from(config.max_lifetime_secs).unwrap_or(i64::MAX);
        let max_lifetime = Duration::try_seconds(secs).unwrap_or(Duration::MAX);
        Self {
            store,
            cipher,
            hasher,
            max_lifetime,
        }
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Build an escrow record for `old_key` without persisting it.
    ///
    /// Returns the record and the ephemeral secret that unlocks it.
    pub fn prepare(
        &self,
        old_key: &SessionKeyHandle,
        now: DateTime<Utc>,
    ) -> Result<(EscrowRecord, SecretString), StrongboxError> {
        let raw = Zeroizing::new(random_array::<ESCROW_SECRET_BYTES>(self.cipher.rng())?);
        let secret = Zeroizing::new(hex::encode(raw.as_ref()));

        let wrap_salt = kdf::new_key_salt(self.cipher.rng(), self.hasher.params())?;
        let wrap_key = self.cipher.derive_key(secret.as_bytes(), &wrap_salt)?;
        let wrapped_master_key = self.cipher.encrypt(old_key.key(), &wrap_key)?;
        let verification_hash = self.hasher.hash(secret.as_bytes())?;

        let record = EscrowRecord {
            wrapped_master_key,
            wrap_salt,
            verification_hash,
            generation: old_key.generation(),
            issued_at: now,
            expires_at: now
                .checked_add_signed(self.max_lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            attempt_count: 0,
        };
        Ok((record, SecretString::from(secret.to_string())))
    }

    /// Escrow `old_key`, replacing any existing escrow.
    ///
    /// The returned secret is shown to the user once and never logged.
    pub async fn issue(
        &self,
        old_key: &SessionKeyHandle,
        now: DateTime<Utc>,
    ) -> Result<SecretString, StrongboxError> {
        let (record, secret) = self.prepare(old_key, now)?;
        self.store.store_escrow(&record).await?;
        info!(
            event = "escrow_issued",
            generation = record.generation,
            expires_at = %record.expires_at,
            "master key escrowed"
        );
        Ok(secret)
    }

    /// Recover the escrowed key with the ephemeral secret.
    ///
    /// An expired or exhausted escrow is destroyed and reported as `Expired`,
    /// as is one that was replaced while this call ran. A wrong secret durably
    /// bumps the attempt counter and fails with `InvalidCandidate`.
    pub async fn recover(
        &self,
        candidate: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        let Some(record) = self.store.load_escrow().await? else {
            warn!(event = "escrow_rejected", reason = "absent", "escrow recovery rejected");
            return Err(StrongboxError::Expired);
        };

        if now > record.expires_at {
            self.destroy(&record, "expired").await?;
            return Err(StrongboxError::Expired);
        }

        let Some(attempts) = self
            .store
            .claim_escrow_attempt(record.issued_at, MAX_ESCROW_ATTEMPTS)
            .await?
        else {
            self.destroy(&record, "attempts_exhausted").await?;
            return Err(StrongboxError::Expired);
        };

        let secret = candidate.expose_secret().as_bytes();
        if !self.hasher.verify(secret, &record.verification_hash, false) {
            warn!(
                event = "escrow_rejected",
                reason = "mismatch",
                attempts,
                max_attempts = MAX_ESCROW_ATTEMPTS,
                "escrow recovery rejected"
            );
            return Err(StrongboxError::InvalidCandidate);
        }
        self.store.release_escrow_attempt(record.issued_at).await?;

        let wrap_key = self.cipher.derive_key(secret, &record.wrap_salt)?;
        let key = self
            .cipher
            .decrypt_secret(&record.wrapped_master_key, &wrap_key)?;
        let handle = SessionKeyHandle::from_slice(&key, record.generation)
            .ok_or(StrongboxError::DecryptionFailed)?;

        info!(
            event = "escrow_recovered",
            generation = record.generation,
            "previous master key recovered from escrow"
        );
        Ok(handle)
    }

    /// Delete `record` if it is still the stored escrow and log why.
    async fn destroy(&self, record: &EscrowRecord, reason: &str) -> Result<(), StrongboxError> {
        if self.store.clear_escrow(record.issued_at).await? {
            warn!(
                event = "escrow_rejected",
                reason,
                generation = record.generation,
                "escrow recovery rejected, escrow destroyed"
            );
        } else {
            warn!(
                event = "escrow_rejected",
                reason = "replaced",
                "escrow recovery rejected, escrow changed during recovery"
            );
        }
        Ok(())
    }

    /// Metadata of the current escrow, if any.
    pub async fn status(&self) -> Result<Option<EscrowStatus>, StrongboxError> {
        Ok(self.store.load_escrow().await?.map(|record| record.status()))
    }

    /// Destroy the escrow issued at `issued_at`, leaving any newer one alone.
    ///
    /// Returns `false` if that escrow is no longer stored.
    pub async fn clear(&self, issued_at: DateTime<Utc>) -> Result<bool, StrongboxError> {
        let cleared = self.store.clear_escrow(issued_at).await?;
        if cleared {
            info!(event = "escrow_cleared", "escrow destroyed");
        }
        Ok(cleared)
    }
}
