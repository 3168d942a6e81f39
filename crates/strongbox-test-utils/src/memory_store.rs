// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory key store for unit and integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use strongbox_core::{
    EscrowRecord, HashRecord, ItemSecret, KeyStore, MasterKeyEnvelope, StrongboxError,
    UserKeyWrap,
};

#[derive(Default)]
struct State {
    envelope: Option<MasterKeyEnvelope>,
    escrow: Option<EscrowRecord>,
    users: BTreeMap<String, UserKeyWrap>,
    items: BTreeMap<(String, String), ItemSecret>,
    queued_escrow: Option<EscrowRecord>,
}

/// A [`KeyStore`] backed by a mutex-guarded map.
///
/// Clones share the same state, so a test can hold one handle for
/// inspection while the vault owns another.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    state: Arc<Mutex<State>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored envelope, bypassing every check.
    pub async fn put_envelope(&self, envelope: MasterKeyEnvelope) {
        self.state.lock().await.envelope = Some(envelope);
    }

    /// Overwrite the stored escrow, bypassing every check.
    pub async fn put_escrow(&self, escrow: Option<EscrowRecord>) {
        self.state.lock().await.escrow = escrow;
    }

    /// Install `escrow` right after the next `load_escrow` returns, as if a
    /// concurrent password change had replaced it.
    pub async fn replace_escrow_after_next_load(&self, escrow: EscrowRecord) {
        self.state.lock().await.queued_escrow = Some(escrow);
    }

    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load_envelope(&self) -> Result<Option<MasterKeyEnvelope>, StrongboxError> {
        Ok(self.state.lock().await.envelope.clone())
    }

    async fn create_envelope(&self, envelope: &MasterKeyEnvelope) -> Result<(), StrongboxError> {
        let mut state = self.state.lock().await;
        if state.envelope.is_some() {
            return Err(StrongboxError::AlreadyInitialized);
        }
        state.envelope = Some(envelope.clone());
        Ok(())
    }

    async fn replace_verification_hash(
        &self,
        expected: &HashRecord,
        replacement: &HashRecord,
    ) -> Result<bool, StrongboxError> {
        let mut state = self.state.lock().await;
        match state.envelope.as_mut() {
            Some(env) if env.verification_hash == *expected => {
                env.verification_hash = replacement.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_rotation(
        &self,
        expected_generation: i64,
        envelope: &MasterKeyEnvelope,
        escrow: &EscrowRecord,
    ) -> Result<(), StrongboxError> {
        let mut state = self.state.lock().await;
        match state.envelope.as_ref() {
            Some(env) if env.generation == expected_generation => {
                state.envelope = Some(envelope.clone());
                state.escrow = Some(escrow.clone());
                Ok(())
            }
            _ => Err(StrongboxError::Conflict(format!(
                "master envelope is no longer at generation {expected_generation}"
            ))),
        }
    }

    async fn load_escrow(&self) -> Result<Option<EscrowRecord>, StrongboxError> {
        let mut state = self.state.lock().await;
        let loaded = state.escrow.clone();
        if let Some(queued) = state.queued_escrow.take() {
            state.escrow = Some(queued);
        }
        Ok(loaded)
    }

    async fn store_escrow(&self, escrow: &EscrowRecord) -> Result<(), StrongboxError> {
        self.state.lock().await.escrow = Some(escrow.clone());
        Ok(())
    }

    async fn claim_escrow_attempt(
        &self,
        issued_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, StrongboxError> {
        let mut state = self.state.lock().await;
        match state.escrow.as_mut() {
            Some(escrow)
                if escrow.issued_at == issued_at && escrow.attempt_count < max_attempts =>
            {
                escrow.attempt_count += 1;
                Ok(Some(escrow.attempt_count))
            }
            _ => Ok(None),
        }
    }

    async fn release_escrow_attempt(
        &self,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StrongboxError> {
        let mut state = self.state.lock().await;
        if let Some(escrow) = state.escrow.as_mut().filter(|e| e.issued_at == issued_at) {
            escrow.attempt_count = escrow.attempt_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn clear_escrow(&self, issued_at: DateTime<Utc>) -> Result<bool, StrongboxError> {
        let mut state = self.state.lock().await;
        match &state.escrow {
            Some(escrow) if escrow.issued_at == issued_at => {
                state.escrow = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_user_wrap(&self, user_id: &str) -> Result<Option<UserKeyWrap>, StrongboxError> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn store_user_wrap(&self, wrap: &UserKeyWrap) -> Result<(), StrongboxError> {
        self.state
            .lock()
            .await
            .users
            .insert(wrap.user_id.clone(), wrap.clone());
        Ok(())
    }

    async fn delete_user_wrap(&self, user_id: &str) -> Result<bool, StrongboxError> {
        Ok(self.state.lock().await.users.remove(user_id).is_some())
    }

    async fn load_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<Option<ItemSecret>, StrongboxError> {
        let key = (item_id.to_string(), field.to_string());
        Ok(self.state.lock().await.items.get(&key).cloned())
    }

    async fn store_item_secret(&self, item: &ItemSecret) -> Result<(), StrongboxError> {
        let key = (item.item_id.clone(), item.field.clone());
        self.state.lock().await.items.insert(key, item.clone());
        Ok(())
    }

    async fn store_current_item_secret(&self, item: &ItemSecret) -> Result<bool, StrongboxError> {
        let mut state = self.state.lock().await;
        let current = state.envelope.as_ref().map(|envelope| envelope.generation);
        if current != Some(item.generation) {
            return Ok(false);
        }
        let key = (item.item_id.clone(), item.field.clone());
        state.items.insert(key, item.clone());
        Ok(true)
    }

    async fn delete_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<bool, StrongboxError> {
        let key = (item_id.to_string(), field.to_string());
        Ok(self.state.lock().await.items.remove(&key).is_some())
    }

    async fn list_items_by_generation(
        &self,
        generation: i64,
        limit: usize,
    ) -> Result<Vec<ItemSecret>, StrongboxError> {
        let state = self.state.lock().await;
        let mut items: Vec<ItemSecret> = state
            .items
            .values()
            .filter(|item| item.generation == generation)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.item_id.cmp(&b.item_id))
                .then_with(|| a.field.cmp(&b.field))
        });
        items.truncate(limit);
        Ok(items)
    }

    async fn count_stale_items(&self, current: i64) -> Result<u64, StrongboxError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.generation < current)
            .count() as u64)
    }

    async fn replace_item_secret(
        &self,
        expected: &ItemSecret,
        replacement: &ItemSecret,
    ) -> Result<bool, StrongboxError> {
        let mut state = self.state.lock().await;
        let key = (expected.item_id.clone(), expected.field.clone());
        match state.items.get_mut(&key) {
            Some(stored)
                if stored.generation == expected.generation
                    && stored.secret == expected.secret =>
            {
                stored.secret = replacement.secret.clone();
                stored.generation = replacement.generation;
                stored.updated_at = replacement.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use strongbox_core::EncryptedSecret;

    fn envelope(generation: i64) -> MasterKeyEnvelope {
        MasterKeyEnvelope {
            verification_hash: HashRecord::from_bytes(vec![0x02, generation as u8]),
            key_salt: vec![0; 16],
            generation,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_is_once_only() {
        let store = MemoryKeyStore::new();
        store.create_envelope(&envelope(1)).await.unwrap();
        assert!(matches!(
            store.create_envelope(&envelope(1)).await,
            Err(StrongboxError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn rotation_checks_generation() {
        let store = MemoryKeyStore::new();
        store.create_envelope(&envelope(1)).await.unwrap();
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let escrow = EscrowRecord {
            wrapped_master_key: EncryptedSecret::new(vec![1], vec![2]),
            wrap_salt: vec![3],
            verification_hash: HashRecord::from_bytes(vec![4]),
            generation: 1,
            issued_at,
            expires_at: issued_at,
            attempt_count: 0,
        };
        assert!(matches!(
            store.commit_rotation(7, &envelope(8), &escrow).await,
            Err(StrongboxError::Conflict(_))
        ));
        store.commit_rotation(1, &envelope(2), &escrow).await.unwrap();
        assert_eq!(store.load_envelope().await.unwrap().unwrap().generation, 2);
        assert_eq!(store.claim_escrow_attempt(issued_at, 1).await.unwrap(), Some(1));
        assert_eq!(store.claim_escrow_attempt(issued_at, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_escrow_leaves_a_newer_escrow() {
        let store = MemoryKeyStore::new();
        let first = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let second = first + chrono::Duration::minutes(5);
        let escrow = |issued_at| EscrowRecord {
            wrapped_master_key: EncryptedSecret::new(vec![1], vec![2]),
            wrap_salt: vec![3],
            verification_hash: HashRecord::from_bytes(vec![4]),
            generation: 1,
            issued_at,
            expires_at: issued_at,
            attempt_count: 0,
        };
        store.put_escrow(Some(escrow(second))).await;

        assert!(!store.clear_escrow(first).await.unwrap());
        assert!(store.load_escrow().await.unwrap().is_some());
        assert!(store.clear_escrow(second).await.unwrap());
        assert!(store.load_escrow().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn current_item_write_requires_matching_generation() {
        let store = MemoryKeyStore::new();
        let item = |generation| ItemSecret {
            item_id: "acct".into(),
            field: "password".into(),
            secret: EncryptedSecret::new(vec![1; 48], vec![2; 16]),
            generation,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        assert!(!store.store_current_item_secret(&item(1)).await.unwrap());

        store.create_envelope(&envelope(2)).await.unwrap();
        assert!(!store.store_current_item_secret(&item(1)).await.unwrap());
        assert_eq!(store.item_count().await, 0);
        assert!(store.store_current_item_secret(&item(2)).await.unwrap());
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryKeyStore::new();
        let other = store.clone();
        store.create_envelope(&envelope(1)).await.unwrap();
        assert!(other.load_envelope().await.unwrap().is_some());
    }
}
