// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence trait for master-key state and item secrets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StrongboxError;
use crate::types::{EscrowRecord, HashRecord, ItemSecret, MasterKeyEnvelope, UserKeyWrap};

/// Row-level key/value store backing the vault.
///
/// Every method reads or writes fresh state; implementations must not cache
/// across calls. Methods documented as atomic must apply fully or not at all.
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    // --- Master key envelope ---

    /// Load the singleton envelope, if a master password has been set.
    async fn load_envelope(&self) -> Result<Option<MasterKeyEnvelope>, StrongboxError>;

    /// Insert the first envelope. Fails with `AlreadyInitialized` if one exists.
    async fn create_envelope(&self, envelope: &MasterKeyEnvelope) -> Result<(), StrongboxError>;

    /// Compare-and-swap the verification hash.
    ///
    /// Returns `false` without writing if the stored hash is no longer `expected`.
    async fn replace_verification_hash(
        &self,
        expected: &HashRecord,
        replacement: &HashRecord,
    ) -> Result<bool, StrongboxError>;

    /// Atomically replace the envelope and install the escrow for the old key.
    ///
    /// Fails with `Conflict` and writes nothing if the stored generation is not
    /// `expected_generation`.
    async fn commit_rotation(
        &self,
        expected_generation: i64,
        envelope: &MasterKeyEnvelope,
        escrow: &EscrowRecord,
    ) -> Result<(), StrongboxError>;

    // --- Temporary key escrow ---

    async fn load_escrow(&self) -> Result<Option<EscrowRecord>, StrongboxError>;

    /// Install an escrow, replacing any previous one.
    async fn store_escrow(&self, escrow: &EscrowRecord) -> Result<(), StrongboxError>;

    /// Atomically reserve one recovery attempt on the escrow issued at `issued_at`.
    ///
    /// Increments the counter only while it is below `max_attempts` and
    /// returns the new count. Returns `None` without writing if that escrow is
    /// gone, was replaced, or has no attempts left.
    async fn claim_escrow_attempt(
        &self,
        issued_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Option<u32>, StrongboxError>;

    /// Give back an attempt reserved by a recovery that succeeded.
    ///
    /// A no-op if the escrow issued at `issued_at` is gone or was replaced.
    async fn release_escrow_attempt(&self, issued_at: DateTime<Utc>)
    -> Result<(), StrongboxError>;

    /// Destroy the escrow issued at `issued_at`.
    ///
    /// Returns `false` without writing if the stored escrow is a different one
    /// (or none exists).
    async fn clear_escrow(&self, issued_at: DateTime<Utc>) -> Result<bool, StrongboxError>;

    // --- Per-user master key wraps ---

    async fn load_user_wrap(&self, user_id: &str) -> Result<Option<UserKeyWrap>, StrongboxError>;

    async fn store_user_wrap(&self, wrap: &UserKeyWrap) -> Result<(), StrongboxError>;

    /// Returns `true` if a wrap was deleted.
    async fn delete_user_wrap(&self, user_id: &str) -> Result<bool, StrongboxError>;

    // --- Item secrets ---

    async fn load_item_secret(
        &self,
        item_id: &str,
        field: &str,
    ) -> Result<Option<ItemSecret>, StrongboxError>;

    /// Insert or overwrite an item secret.
    async fn store_item_secret(&self, item: &ItemSecret) -> Result<(), StrongboxError>;

    /// Insert or overwrite an item secret only while the stored envelope is
    /// still at `item.generation`.
    ///
    /// The generation check and the write are atomic. Returns `false` without
    /// writing if the envelope is missing or at another generation.
    async fn store_current_item_secret(&self, item: &ItemSecret) -> Result<bool, StrongboxError>;

    /// Returns `true` if a secret was deleted.
    async fn delete_item_secret(&self, item_id: &str, field: &str)
    -> Result<bool, StrongboxError>;

    /// Up to `limit` item secrets encrypted under `generation`, oldest first.
    async fn list_items_by_generation(
        &self,
        generation: i64,
        limit: usize,
    ) -> Result<Vec<ItemSecret>, StrongboxError>;

    /// Number of item secrets encrypted under any generation below `current`.
    async fn count_stale_items(&self, current: i64) -> Result<u64, StrongboxError>;

    /// Compare-and-swap an item secret.
    ///
    /// Writes `replacement` only if the stored row still holds exactly the
    /// generation and ciphertext of `expected`. Returns `false` without writing
    /// if it was rewritten concurrently or deleted.
    async fn replace_item_secret(
        &self,
        expected: &ItemSecret,
        replacement: &ItemSecret,
    ) -> Result<bool, StrongboxError>;
}
