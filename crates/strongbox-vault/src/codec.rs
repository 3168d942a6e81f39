// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The entry points the rest of the application calls.
//!
//! `VaultCodec` owns one [`CipherContext`] and one handle to the [`KeyStore`]
//! and wires the lifecycle, escrow, per-user wraps, re-encryption and RSA
//! transport around them. It holds no key material itself: every operation
//! that needs a key takes a [`SessionKeyHandle`].

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use strongbox_config::model::StrongboxConfig;
use strongbox_core::{
    EncryptedSecret, EscrowStatus, ItemSecret, KeyStore, MasterKeyState, StrongboxError,
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cipher::CipherContext;
use crate::envelope::{MasterKeyLifecycle, MasterKeyRotation};
use crate::escrow::TemporaryKeyEscrow;
use crate::hasher::PasswordHasher;
use crate::random::{RandomSource, SystemRandomSource};
use crate::rekey::{RekeyReport, Rekeyer};
use crate::session::SessionKeyHandle;
use crate::transport::AsymmetricTransport;
use crate::users::UserKeyring;

/// Composition root of the key-management core.
#[derive(Clone)]
pub struct VaultCodec {
    store: Arc<dyn KeyStore>,
    cipher: CipherContext,
    lifecycle: MasterKeyLifecycle,
    escrow: TemporaryKeyEscrow,
    keyring: UserKeyring,
    rekeyer: Rekeyer,
    transport: AsymmetricTransport,
}

impl VaultCodec {
    /// Build a codec backed by the operating system RNG.
    ///
    /// Fails with `CipherUnavailable` if the cipher self-test does not pass.
    pub fn new(
        config: &StrongboxConfig,
        store: Arc<dyn KeyStore>,
    ) -> Result<Self, StrongboxError> {
        Self::with_random(config, store, Arc::new(SystemRandomSource::new()))
    }

    pub fn with_random(
        config: &StrongboxConfig,
        store: Arc<dyn KeyStore>,
        rng: Arc<dyn RandomSource>,
    ) -> Result<Self, StrongboxError> {
        let cipher = CipherContext::initialize(rng.clone())?;
        let hasher = PasswordHasher::from_config(&config.vault, rng);
        let escrow =
            TemporaryKeyEscrow::new(store.clone(), cipher.clone(), hasher.clone(), &config.escrow);
        Ok(Self {
            lifecycle: MasterKeyLifecycle::new(
                store.clone(),
                cipher.clone(),
                hasher.clone(),
                escrow.clone(),
            ),
            keyring: UserKeyring::new(store.clone(), cipher.clone(), hasher),
            rekeyer: Rekeyer::new(store.clone(), cipher.clone()),
            transport: AsymmetricTransport::new(&config.transport),
            escrow,
            cipher,
            store,
        })
    }

    pub fn transport(&self) -> &AsymmetricTransport {
        &self.transport
    }

    // --- item secrets ---

    /// Encrypt `plaintext` under the session's master key.
    ///
    /// Fails with `Expired` if the master password changed after the session
    /// was opened, so nothing new is sealed under a superseded key.
    pub async fn protect_for_storage(
        &self,
        plaintext: &str,
        session: &SessionKeyHandle,
    ) -> Result<EncryptedSecret, StrongboxError> {
        self.ensure_current(session).await?;
        self.cipher.encrypt(plaintext.as_bytes(), session.key())
    }

    async fn ensure_current(&self, session: &SessionKeyHandle) -> Result<(), StrongboxError> {
        let current = self
            .store
            .load_envelope()
            .await?
            .ok_or(StrongboxError::NotInitialized)?
            .generation;
        if current != session.generation() {
            warn!(
                event = "stale_session",
                session_generation = session.generation(),
                current,
                "write refused, master password changed since the session was opened"
            );
            return Err(StrongboxError::Expired);
        }
        Ok(())
    }

    /// Decrypt a stored secret with the session's master key.
    ///
    /// The empty secret reveals as the empty string. Plaintext that is not
    /// UTF-8 is reported as `DecryptionFailed`.
    pub fn reveal_from_storage(
        &self,
        secret: &EncryptedSecret,
        session: &SessionKeyHandle,
    ) -> Result<SecretString, StrongboxError> {
        let plaintext = self.cipher.decrypt_secret(secret, session.key())?;
        let text = std::str::from_utf8(&plaintext).map_err(|_| StrongboxError::DecryptionFailed)?;
        Ok(SecretString::from(text.to_string()))
    }

    /// Encrypt and persist one field of an item.
    ///
    /// The row is only written while the stored master envelope is still at the
    /// session's generation; otherwise this fails with `Expired` and writes nothing.
    pub async fn store_item_secret(
        &self,
        item_id: &str,
        field: &str,
        plaintext: &str,
        session: &SessionKeyHandle,
    ) -> Result<(), StrongboxError> {
        let item = ItemSecret {
            item_id: item_id.to_string(),
            field: field.to_string(),
            secret: self.cipher.encrypt(plaintext.as_bytes(), session.key())?,
            generation: session.generation(),
            updated_at: Utc::now(),
        };
        if self.store.store_current_item_secret(&item).await? {
            return Ok(());
        }
        self.ensure_current(session).await?;
        Err(StrongboxError::Conflict(
            "master envelope changed while storing the item".to_string(),
        ))
    }

    /// Load and decrypt one field of an item. `None` if the field was never stored.
    ///
    /// A row written under a different generation than the session fails with
    /// `DecryptionFailed`; recover the previous key from escrow to read it.
    pub async fn load_item_secret(
        &self,
        item_id: &str,
        field: &str,
        session: &SessionKeyHandle,
    ) -> Result<Option<SecretString>, StrongboxError> {
        let Some(item) = self.store.load_item_secret(item_id, field).await? else {
            return Ok(None);
        };
        if item.generation != session.generation() {
            debug!(
                item_id,
                field,
                item_generation = item.generation,
                session_generation = session.generation(),
                "item secret belongs to another key generation"
            );
            return Err(StrongboxError::DecryptionFailed);
        }
        self.reveal_from_storage(&item.secret, session).map(Some)
    }

    pub async fn delete_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<bool, StrongboxError> {
        self.store.delete_item_secret(item_id, field).await
    }

    // --- master password lifecycle ---

    pub async fn state(&self) -> Result<MasterKeyState, StrongboxError> {
        self.lifecycle.state().await
    }

    /// Set the first master password and return a session for it.
    pub async fn set_master_password(
        &self,
        password: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        self.lifecycle.set(password, Utc::now()).await
    }

    /// Verify the master password and derive the session key from it.
    pub async fn unlock_session(
        &self,
        candidate: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        self.lifecycle.unlock(candidate).await
    }

    /// Replace the master password. The previous key goes into escrow.
    pub async fn change_master_password(
        &self,
        old: &SecretString,
        new: &SecretString,
    ) -> Result<MasterKeyRotation, StrongboxError> {
        self.lifecycle.change(old, new, Utc::now()).await
    }

    // --- escrow ---

    /// Escrow the key held by `session`, replacing any existing escrow.
    pub async fn issue_escrow(
        &self,
        session: &SessionKeyHandle,
    ) -> Result<SecretString, StrongboxError> {
        self.escrow.issue(session, Utc::now()).await
    }

    /// Recover the escrowed key with the ephemeral secret.
    pub async fn recover_from_escrow(
        &self,
        candidate: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        self.escrow.recover(candidate, Utc::now()).await
    }

    pub async fn escrow_status(&self) -> Result<Option<EscrowStatus>, StrongboxError> {
        self.escrow.status().await
    }

    // --- per-user wraps ---

    pub async fn wrap_for_user(
        &self,
        user_id: &str,
        login_password: &SecretString,
        session: &SessionKeyHandle,
    ) -> Result<(), StrongboxError> {
        self.keyring
            .wrap_for_user(user_id, login_password, session, Utc::now())
            .await
    }

    pub async fn unlock_for_user(
        &self,
        user_id: &str,
        login_password: &SecretString,
    ) -> Result<SessionKeyHandle, StrongboxError> {
        self.keyring.unlock_for_user(user_id, login_password).await
    }

    pub async fn remove_user_wrap(&self, user_id: &str) -> Result<bool, StrongboxError> {
        self.keyring.remove_user_wrap(user_id).await
    }

    // --- rotation ---

    /// Re-encrypt items from the `from` generation to the `to` generation.
    pub async fn rekey(
        &self,
        from: &SessionKeyHandle,
        to: &SessionKeyHandle,
        batch_size: usize,
    ) -> Result<RekeyReport, StrongboxError> {
        self.rekeyer.run(from, to, batch_size, Utc::now()).await
    }

    /// Clear the escrow if nothing is left to re-encrypt.
    pub async fn finish_rotation(
        &self,
        current: &SessionKeyHandle,
    ) -> Result<bool, StrongboxError> {
        self.rekeyer.finish_rotation(current, &self.escrow).await
    }

    // --- client-encrypted values ---

    /// The PEM public key clients encrypt with. Generates the pair on first use.
    pub fn public_key_pem(&self) -> Result<String, StrongboxError> {
        self.transport.public_key_pem()
    }

    /// Decrypt a base64 RSA ciphertext submitted by a client.
    pub fn decrypt_client_value(&self, encoded: &str) -> Result<SecretString, StrongboxError> {
        let ciphertext = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| StrongboxError::DecryptionFailed)?,
        );
        let plaintext = self.transport.decrypt(&ciphertext)?;
        let text = std::str::from_utf8(&plaintext).map_err(|_| StrongboxError::DecryptionFailed)?;
        Ok(SecretString::from(text.to_string()))
    }

    /// Decrypt a client value, treating undecryptable input as plaintext.
    ///
    /// Missing key material is still an error.
    pub fn unprotect_client_value(
        &self,
        input: &SecretString,
    ) -> Result<SecretString, StrongboxError> {
        match self.decrypt_client_value(input.expose_secret()) {
            Ok(value) => Ok(value),
            Err(StrongboxError::DecryptionFailed) => {
                warn!(
                    event = "client_value_not_encrypted",
                    "client value did not decrypt, using it as plaintext"
                );
                Ok(input.clone())
            }
            Err(other) => Err(other),
        }
    }
}

impl std::fmt::Debug for VaultCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCodec")
            .field("key_dir", &self.transport.public_key_path().parent())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::testing::FailingRandom;
    use strongbox_test_utils::{MemoryKeyStore, TestEnv};

    fn codec() -> (TestEnv, MemoryKeyStore, VaultCodec) {
        let env = TestEnv::new().unwrap();
        let store = MemoryKeyStore::new();
        let codec = VaultCodec::new(&env.config, Arc::new(store.clone())).unwrap();
        (env, store, codec)
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn protect_and_reveal_roundtrip() {
        let (_env, _store, codec) = codec();
        let session = codec.set_master_password(&secret("master")).await.unwrap();

        let stored = codec.protect_for_storage("s3cret value ", &session).await.unwrap();
        assert_ne!(stored.ciphertext, b"s3cret value ".to_vec());
        let shown = codec.reveal_from_storage(&stored, &session).unwrap();
        assert_eq!(shown.expose_secret(), "s3cret value ");
    }

    #[tokio::test]
    async fn empty_secret_reveals_as_empty() {
        let (_env, _store, codec) = codec();
        let session = codec.set_master_password(&secret("master")).await.unwrap();

        let stored = codec.protect_for_storage("", &session).await.unwrap();
        assert!(stored.is_empty());
        assert_eq!(codec.reveal_from_storage(&stored, &session).unwrap().expose_secret(), "");
    }

    #[tokio::test]
    async fn item_secret_roundtrip_and_missing() {
        let (_env, store, codec) = codec();
        let session = codec.set_master_password(&secret("master")).await.unwrap();

        codec
            .store_item_secret("acct-1", "password", "hunter2", &session)
            .await
            .unwrap();
        assert_eq!(store.item_count().await, 1);

        let value = codec
            .load_item_secret("acct-1", "password", &session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose_secret(), "hunter2");
        assert!(
            codec
                .load_item_secret("acct-1", "notes", &session)
                .await
                .unwrap()
                .is_none()
        );

        assert!(codec.delete_item_secret("acct-1", "password").await.unwrap());
        assert_eq!(store.item_count().await, 0);
    }

    #[tokio::test]
    async fn stale_item_needs_previous_key() {
        let (_env, _store, codec) = codec();
        let old = codec.set_master_password(&secret("old master")).await.unwrap();
        codec
            .store_item_secret("acct-1", "password", "hunter2", &old)
            .await
            .unwrap();

        let rotation = codec
            .change_master_password(&secret("old master"), &secret("new master"))
            .await
            .unwrap();
        let err = codec
            .load_item_secret("acct-1", "password", &rotation.session)
            .await
            .unwrap_err();
        assert!(matches!(err, StrongboxError::DecryptionFailed));

        let recovered = codec
            .recover_from_escrow(&rotation.escrow_secret)
            .await
            .unwrap();
        let value = codec
            .load_item_secret("acct-1", "password", &recovered)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose_secret(), "hunter2");
    }

    #[tokio::test]
    async fn stale_session_cannot_write_after_rotation() {
        let (_env, store, codec) = codec();
        let old = codec.set_master_password(&secret("old master")).await.unwrap();
        codec
            .store_item_secret("acct-1", "password", "hunter2", &old)
            .await
            .unwrap();
        let rotation = codec
            .change_master_password(&secret("old master"), &secret("new master"))
            .await
            .unwrap();
        let previous = codec.recover_from_escrow(&rotation.escrow_secret).await.unwrap();
        codec.rekey(&previous, &rotation.session, 10).await.unwrap();
        assert!(codec.finish_rotation(&rotation.session).await.unwrap());

        let err = codec
            .store_item_secret("acct-2", "password", "late write", &old)
            .await
            .unwrap_err();
        assert!(matches!(err, StrongboxError::Expired));
        let err = codec
            .store_item_secret("acct-1", "password", "overwrite", &old)
            .await
            .unwrap_err();
        assert!(matches!(err, StrongboxError::Expired));
        assert!(matches!(
            codec.protect_for_storage("late", &old).await,
            Err(StrongboxError::Expired)
        ));

        assert_eq!(store.item_count().await, 1);
        assert_eq!(store.count_stale_items(2).await.unwrap(), 0);
        let value = codec
            .load_item_secret("acct-1", "password", &rotation.session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.expose_secret(), "hunter2");
        assert!(codec.finish_rotation(&rotation.session).await.unwrap());
    }

    #[tokio::test]
    async fn rekey_then_finish_rotation_clears_escrow() {
        let (_env, _store, codec) = codec();
        let old = codec.set_master_password(&secret("old master")).await.unwrap();
        for i in 0..5 {
            codec
                .store_item_secret(&format!("acct-{i}"), "password", "pw", &old)
                .await
                .unwrap();
        }
        let rotation = codec
            .change_master_password(&secret("old master"), &secret("new master"))
            .await
            .unwrap();
        assert!(matches!(
            codec.state().await.unwrap(),
            MasterKeyState::Changing { generation: 2, previous: 1 }
        ));

        let previous = codec.recover_from_escrow(&rotation.escrow_secret).await.unwrap();
        let report = codec.rekey(&previous, &rotation.session, 2).await.unwrap();
        assert_eq!(report.migrated, 5);
        assert_eq!(report.remaining, 0);

        assert!(codec.finish_rotation(&rotation.session).await.unwrap());
        assert!(codec.escrow_status().await.unwrap().is_none());
        assert_eq!(
            codec.state().await.unwrap(),
            MasterKeyState::Active { generation: 2 }
        );
    }

    #[tokio::test]
    async fn user_wrap_unlocks_same_key() {
        let (_env, _store, codec) = codec();
        let session = codec.set_master_password(&secret("master")).await.unwrap();
        codec
            .wrap_for_user("alice", &secret("login pw"), &session)
            .await
            .unwrap();

        let unlocked = codec.unlock_for_user("alice", &secret("login pw")).await.unwrap();
        let stored = codec.protect_for_storage("shared", &session).await.unwrap();
        assert_eq!(
            codec.reveal_from_storage(&stored, &unlocked).unwrap().expose_secret(),
            "shared"
        );
        assert!(codec.remove_user_wrap("alice").await.unwrap());
    }

    #[test]
    fn client_value_roundtrip_and_fallback() {
        let (_env, _store, codec) = codec();
        let pem = codec.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let ciphertext = crate::transport::tests::encrypt_for(
            codec.transport(),
            codec.transport().padding(),
            b"hunter2",
        );
        let encoded = STANDARD.encode(ciphertext);
        let value = codec.unprotect_client_value(&secret(&encoded)).unwrap();
        assert_eq!(value.expose_secret(), "hunter2");

        let plain = codec.unprotect_client_value(&secret("typed in clear")).unwrap();
        assert_eq!(plain.expose_secret(), "typed in clear");
    }

    #[test]
    fn client_value_without_keys_is_fatal() {
        let (_env, _store, codec) = codec();
        let err = codec
            .unprotect_client_value(&secret(&STANDARD.encode([1u8; 128])))
            .unwrap_err();
        assert!(matches!(err, StrongboxError::KeyMaterialMissing { .. }));
    }

    #[test]
    fn broken_rng_fails_construction() {
        let env = TestEnv::new().unwrap();
        let err = VaultCodec::with_random(
            &env.config,
            Arc::new(MemoryKeyStore::new()),
            Arc::new(FailingRandom),
        )
        .unwrap_err();
        assert!(matches!(err, StrongboxError::CipherUnavailable(_)));
    }
}
