// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master password lifecycle: `Unset -> Active -> Changing -> Active`.
//!
//! The verified master password is the key material: the session key is
//! `derive_key(master_password, envelope.key_salt)`. Nothing wraps the master
//! key in the common case; only rotation (escrow) and per-user wraps do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use strongbox_core::{KeyStore, MasterKeyEnvelope, MasterKeyState, StrongboxError};
use tracing::{debug, info, warn};

use crate::cipher::CipherContext;
use crate::escrow::TemporaryKeyEscrow;
use crate::hasher::PasswordHasher;
use crate::kdf;
use crate::session::SessionKeyHandle;

/// Result of a successful master password change.
#[derive(Debug)]
pub struct MasterKeyRotation {
    /// Session for the new master key. All new writes use it.
    pub session: SessionKeyHandle,
    /// Unlocks the escrowed previous key until the escrow expires.
    pub escrow_secret: SecretString,
    pub previous_generation: i64,
}

/// Set, verify, unlock and change the deployment master password.
#[derive(Clone)]
pub struct MasterKeyLifecycle {
    store: Arc<dyn KeyStore>,
    cipher: CipherContext,
    hasher: PasswordHasher,
    escrow: TemporaryKeyEscrow,
}

impl MasterKeyLifecycle {
    pub fn new(
        store: Arc<dyn KeyStore>,
        cipher: CipherContext,
        hasher: PasswordHasher,
        escrow: TemporaryKeyEscrow,
    ) -> Self {
        Self {
            store,
            cipher,
            hasher,
            escrow,
        }
    }

    /// Where the master password is in its lifecycle.
    pub async fn state(&self) -> Result<MasterKeyState, StrongboxError> {
        let Some(envelope) = self.store.load_envelope().await? else {
            return Ok(MasterKeyState::Unset);
        };
        match self.store.load_escrow().await? {
            Some(escrow) if escrow.generation < envelope.generation => {
                Ok(MasterKeyState::Changing {
                    generation: envelope.generation,
                    previous: escrow.generation,
                })
            }
            _ => Ok(MasterKeyState::Active {
                generation: envelope.generation,
            }),
        }
    }

    /// Set the first master password. Fails if one is already set.
    pub async fn set(
        &self,
        password: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        let pw = password.expose_secret().as_bytes();
        if pw.is_empty() {
            return Err(StrongboxError::InvalidCandidate);
        }
        if self.store.load_envelope().await?.is_some() {
            return Err(StrongboxError::AlreadyInitialized);
        }

        let envelope = MasterKeyEnvelope {
            verification_hash: self.hasher.hash(pw)?,
            key_salt: kdf::new_key_salt(self.cipher.rng(), self.hasher.params())?,
            generation: 1,
            updated_at: now,
        };
        let key = self.cipher.derive_key(pw, &envelope.key_salt)?;
        self.store.create_envelope(&envelope).await?;

        info!(event = "master_password_set", generation = 1, "master password set");
        Ok(SessionKeyHandle::new(key, envelope.generation))
    }

    /// Check `candidate` against the stored verification hash.
    ///
    /// A legacy-format hash that matches is replaced by a current-format hash
    /// (compare-and-swap, so concurrent logins upgrade it once).
    pub async fn verify(
        &self,
        candidate: &SecretString,
    ) -> Result<MasterKeyEnvelope, StrongboxError> {
        let mut envelope = self
            .store
            .load_envelope()
            .await?
            .ok_or(StrongboxError::NotInitialized)?;

        let pw = candidate.expose_secret().as_bytes();
        if !self.hasher.verify(pw, &envelope.verification_hash, true) {
            warn!(event = "master_password_rejected", "master password verification failed");
            return Err(StrongboxError::InvalidCandidate);
        }

        if self.hasher.needs_upgrade(&envelope.verification_hash) {
            let upgraded = self.hasher.hash(pw)?;
            if self
                .store
                .replace_verification_hash(&envelope.verification_hash, &upgraded)
                .await?
            {
                info!(
                    event = "legacy_hash_upgraded",
                    "master password hash upgraded to the current format"
                );
                envelope.verification_hash = upgraded;
            } else {
                debug!("legacy master hash was replaced concurrently");
                envelope = self
                    .store
                    .load_envelope()
                    .await?
                    .ok_or(StrongboxError::NotInitialized)?;
            }
        }
        Ok(envelope)
    }

    /// Verify `candidate` and derive the session key from it.
    pub async fn unlock(
        &self,
        candidate: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        let envelope = self.verify(candidate).await?;
        let key = self
            .cipher
            .derive_key(candidate.expose_secret().as_bytes(), &envelope.key_salt)?;
        debug!(generation = envelope.generation, "session unlocked");
        Ok(SessionKeyHandle::new(key, envelope.generation))
    }

    /// Replace the master password, escrowing the old key.
    ///
    /// The new envelope and the escrow commit together or not at all. Refused
    /// with `Conflict` while an escrow still guards items from an earlier
    /// rotation, since replacing it would strand them.
    pub async fn change(
        &self,
        old: &SecretString,
        new: &SecretString,
        now: DateTime<Utc>,
    ) -> Result<MasterKeyRotation, StrongboxError> {
        let new_pw = new.expose_secret().as_bytes();
        if new_pw.is_empty() {
            return Err(StrongboxError::InvalidCandidate);
        }

        let current = self.verify(old).await?;
        if self.store.load_escrow().await?.is_some() {
            let stale = self.store.count_stale_items(current.generation).await?;
            if stale > 0 {
                return Err(StrongboxError::Conflict(format!(
                    "{stale} item secrets from an earlier rotation are not re-encrypted yet"
                )));
            }
        }

        let old_key = SessionKeyHandle::new(
            self.cipher
                .derive_key(old.expose_secret().as_bytes(), &current.key_salt)?,
            current.generation,
        );

        let next = MasterKeyEnvelope {
            verification_hash: self.hasher.hash(new_pw)?,
            key_salt: kdf::new_key_salt(self.cipher.rng(), self.hasher.params())?,
            generation: current.generation + 1,
            updated_at: now,
        };
        let new_key = self.cipher.derive_key(new_pw, &next.key_salt)?;
        let (escrow, escrow_secret) = self.escrow.prepare(&old_key, now)?;

        self.store
            .commit_rotation(current.generation, &next, &escrow)
            .await?;

        info!(
            event = "master_password_changed",
            previous_generation = current.generation,
            generation = next.generation,
            escrow_expires_at = %escrow.expires_at,
            "master password changed"
        );
        Ok(MasterKeyRotation {
            session: SessionKeyHandle::new(new_key, next.generation),
            escrow_secret,
            previous_generation: current.generation,
        })
    }
}
