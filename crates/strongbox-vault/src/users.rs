// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The master key wrapped under each user's login password.
//!
//! Lets a user unlock the shared master key with their own login password.
//! A wrap made before the latest master password change is stale and is
//! reported as `Expired`: the user must enter the master password once more
//! and get re-wrapped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use strongbox_core::{KeyStore, StrongboxError, UserKeyWrap};
use tracing::{debug, info, warn};

use crate::cipher::CipherContext;
use crate::hasher::PasswordHasher;
use crate::kdf;
use crate::session::SessionKeyHandle;

#[derive(Clone)]
pub struct UserKeyring {
    store: Arc<dyn KeyStore>,
    cipher: CipherContext,
    hasher: PasswordHasher,
}

impl UserKeyring {
    pub fn new(store: Arc<dyn KeyStore>, cipher: CipherContext, hasher: PasswordHasher) -> Self {
        Self {
            store,
            cipher,
            hasher,
        }
    }

    /// Wrap the session's master key under `login_password` for `user_id`.
    pub async fn wrap_for_user(
        &self,
        user_id: &str,
        login_password: &SecretString,
        session: &SessionKeyHandle,
        now: DateTime<Utc>,
    ) -> Result<(), StrongboxError> {
        let wrap_salt = kdf::new_key_salt(self.cipher.rng(), self.hasher.params())?;
        let wrap_key = self
            .cipher
            .derive_key(login_password.expose_secret().as_bytes(), &wrap_salt)?;
        let wrap = UserKeyWrap {
            user_id: user_id.to_string(),
            wrapped_master_key: self.cipher.encrypt(session.key(), &wrap_key)?,
            wrap_salt,
            generation: session.generation(),
            updated_at: now,
        };
        self.store.store_user_wrap(&wrap).await?;
        info!(
            event = "user_key_wrapped",
            user_id,
            generation = wrap.generation,
            "master key wrapped for user"
        );
        Ok(())
    }

    /// Unlock the current master key with a user's login password.
    pub async fn unlock_for_user(
        &self,
        user_id: &str,
        login_password: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        let envelope = self
            .store
            .load_envelope()
            .await?
            .ok_or(StrongboxError::NotInitialized)?;

        let Some(wrap) = self.store.load_user_wrap(user_id).await? else {
            debug!(user_id, "no key wrap for user");
            return Err(StrongboxError::Expired);
        };
        if wrap.generation != envelope.generation {
            warn!(
                event = "user_wrap_stale",
                user_id,
                wrap_generation = wrap.generation,
                generation = envelope.generation,
                "user key wrap predates the current master password"
            );
            return Err(StrongboxError::Expired);
        }

        let wrap_key = self
            .cipher
            .derive_key(login_password.expose_secret().as_bytes(), &wrap.wrap_salt)?;
        let key = match self.cipher.decrypt_secret(&wrap.wrapped_master_key, &wrap_key) {
            Ok(key) => key,
            Err(StrongboxError::DecryptionFailed) => {
                warn!(
                    event = "user_unlock_rejected",
                    user_id,
                    "login password did not unwrap key"
                );
                return Err(StrongboxError::InvalidCandidate);
            }
            Err(other) => return Err(other),
        };
        SessionKeyHandle::from_slice(&key, wrap.generation)
            .ok_or(StrongboxError::DecryptionFailed)
    }

    /// Delete a user's wrap. Returns `true` if one existed.
    pub async fn remove_user_wrap(&self, user_id: &str) -> Result<bool, StrongboxError> {
        let removed = self.store.delete_user_wrap(user_id).await?;
        if removed {
            info!(event = "user_key_unwrapped", user_id, "user key wrap removed");
        }
        Ok(removed)
    }
}
