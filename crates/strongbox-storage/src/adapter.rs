// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`KeyStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use strongbox_config::model::StorageConfig;
use strongbox_core::{
    EscrowRecord, HashRecord, ItemSecret, KeyStore, MasterKeyEnvelope, StrongboxError,
    UserKeyWrap,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed key store.
///
/// The database is opened on the first call to [`SqliteKeyStore::initialize`];
/// every [`KeyStore`] method fails with a storage error before that.
pub struct SqliteKeyStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteKeyStore {
    /// Create a store for the configured path without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize a store in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, StrongboxError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Open the database and apply migrations.
    pub async fn initialize(&self) -> Result<(), StrongboxError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| StrongboxError::Storage {
            source: "key store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite key store initialized");
        Ok(())
    }

    /// Run a trivial query to confirm the connection is usable.
    pub async fn health_check(&self) -> Result<(), StrongboxError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }

    /// Checkpoint the WAL. The connection itself closes when the store drops.
    pub async fn close(&self) -> Result<(), StrongboxError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn db(&self) -> Result<&Database, StrongboxError> {
        self.db.get().ok_or_else(|| StrongboxError::Storage {
            source: "key store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn load_envelope(&self) -> Result<Option<MasterKeyEnvelope>, StrongboxError> {
        queries::envelope::load_envelope(self.db()?).await
    }

    async fn create_envelope(&self, envelope: &MasterKeyEnvelope) -> Result<(), StrongboxError> {
        queries::envelope::create_envelope(self.db()?, envelope).await
    }

    async fn replace_verification_hash(
        &self,
        expected: &HashRecord,
        replacement: &HashRecord,
    ) -> Result<bool, StrongboxError> {
        queries::envelope::replace_verification_hash(self.db()?, expected, replacement).await
    }

    async fn commit_rotation(
        &self,
        expected_generation: i64,
        envelope: &MasterKeyEnvelope,
        escrow: &EscrowRecord,
    ) -> Result<(), StrongboxError> {
        queries::envelope::commit_rotation(self.db()?, expected_generation, envelope, escrow).await
    }

    async fn load_escrow(&self) -> Result<Option<EscrowRecord>, StrongboxError> {
        queries::escrow::load_escrow(self.db()?).await
    }

    async fn store_escrow(&self, escrow: &EscrowRecord) -> Result<(), StrongboxError> {
        queries::escrow::store_escrow(self.db()?, escrow).await
    }

    async fn claim_escrow_attempt(
        &self,
        issued_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, StrongboxError> {
        queries::escrow::claim_escrow_attempt(self.db()?, issued_at, max_attempts).await
    }

    async fn release_escrow_attempt(
        &self,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StrongboxError> {
        queries::escrow::release_escrow_attempt(self.db()?, issued_at).await
    }

    async fn clear_escrow(&self, issued_at: DateTime<Utc>) -> Result<bool, StrongboxError> {
        queries::escrow::clear_escrow(self.db()?, issued_at).await
    }

    async fn load_user_wrap(&self, user_id: &str) -> Result<Option<UserKeyWrap>, StrongboxError> {
        queries::users::load_user_wrap(self.db()?, user_id).await
    }

    async fn store_user_wrap(&self, wrap: &UserKeyWrap) -> Result<(), StrongboxError> {
        queries::users::store_user_wrap(self.db()?, wrap).await
    }

    async fn delete_user_wrap(&self, user_id: &str) -> Result<bool, StrongboxError> {
        queries::users::delete_user_wrap(self.db()?, user_id).await
    }

    async fn load_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<Option<ItemSecret>, StrongboxError> {
        queries::items::load_item_secret(self.db()?, item_id, field).await
    }

    async fn store_item_secret(&self, item: &ItemSecret) -> Result<(), StrongboxError> {
        queries::items::store_item_secret(self.db()?, item).await
    }

    async fn store_current_item_secret(&self, item: &ItemSecret) -> Result<bool, StrongboxError> {
        queries::items::store_current_item_secret(self.db()?, item).await
    }

    async fn delete_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<bool, StrongboxError> {
        queries::items::delete_item_secret(self.db()?, item_id, field).await
    }

    async fn list_items_by_generation(
        &self,
        generation: i64,
        limit: usize,
    ) -> Result<Vec<ItemSecret>, StrongboxError> {
        queries::items::list_items_by_generation(self.db()?, generation, limit).await
    }

    async fn count_stale_items(&self, current: i64) -> Result<u64, StrongboxError> {
        queries::items::count_stale_items(self.db()?, current).await
    }

    async fn replace_item_secret(
        &self,
        expected: &ItemSecret,
        replacement: &ItemSecret,
    ) -> Result<bool, StrongboxError> {
        queries::items::replace_item_secret(self.db()?, expected, replacement).await
    }
}
