// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Re-encryption of item secrets after a master password change.
//!
//! Items are moved from an old-generation key to a new one in bounded
//! batches. Each row is swapped with a compare-and-swap on its previous
//! ciphertext, so a concurrent edit is never overwritten with stale plaintext.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use strongbox_core::{ItemSecret, KeyStore, StrongboxError};
use tracing::{debug, info, warn};

use crate::cipher::CipherContext;
use crate::escrow::TemporaryKeyEscrow;
use crate::session::SessionKeyHandle;

/// Outcome of one re-encryption run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RekeyReport {
    /// Rows rewritten under the new key.
    pub migrated: usize,
    /// Rows changed or deleted by someone else mid-run.
    pub skipped: usize,
    /// Rows the old key could not decrypt.
    pub failed: usize,
    /// Rows still below the new generation after the run.
    pub remaining: u64,
}

#[derive(Clone)]
pub struct Rekeyer {
    store: Arc<dyn KeyStore>,
    cipher: CipherContext,
}

impl Rekeyer {
    pub fn new(store: Arc<dyn KeyStore>, cipher: CipherContext) -> Self {
        Self { store, cipher }
    }

    /// Move every item under `from` to `to`, `batch_size` rows at a time.
    pub async fn run(
        &self,
        from: &SessionKeyHandle,
        to: &SessionKeyHandle,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<RekeyReport, StrongboxError> {
        if from.generation() >= to.generation() {
            return Err(StrongboxError::Conflict(format!(
                "cannot re-encrypt from generation {} to {}",
                from.generation(),
                to.generation()
            )));
        }
        let batch_size = batch_size.max(1);
        let mut report = RekeyReport::default();
        let mut undecryptable: HashSet<(String, String)> = HashSet::new();

        loop {
            let batch = self
                .store
                .list_items_by_generation(from.generation(), batch_size + undecryptable.len())
                .await?;
            let fresh: Vec<ItemSecret> = batch
                .into_iter()
                .filter(|item| {
                    !undecryptable.contains(&(item.item_id.clone(), item.field.clone()))
                })
                .collect();
            if fresh.is_empty() {
                break;
            }
            debug!(rows = fresh.len(), generation = from.generation(), "re-encrypting batch");

            for item in fresh {
                let plaintext = match self.cipher.decrypt_secret(&item.secret, from.key()) {
                    Ok(plaintext) => plaintext,
                    Err(StrongboxError::DecryptionFailed) => {
                        warn!(
                            item_id = %item.item_id,
                            field = %item.field,
                            generation = item.generation,
                            "item secret does not decrypt under the previous key"
                        );
                        report.failed += 1;
                        undecryptable.insert((item.item_id.clone(), item.field.clone()));
                        continue;
                    }
                    Err(other) => return Err(other),
                };

                let replacement = ItemSecret {
                    secret: self.cipher.encrypt(&plaintext, to.key())?,
                    generation: to.generation(),
                    updated_at: now,
                    ..item.clone()
                };
                if self.store.replace_item_secret(&item, &replacement).await? {
                    report.migrated += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }

        report.remaining = self.store.count_stale_items(to.generation()).await?;
        info!(
            event = "rekey_completed",
            from = from.generation(),
            to = to.generation(),
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failed,
            remaining = report.remaining,
            "re-encryption pass finished"
        );
        Ok(report)
    }

    /// Destroy the escrow once no item is left below `current`'s generation.
    ///
    /// An escrow of `current`'s generation or later belongs to a newer
    /// password change and is kept.
    ///
    /// Returns `true` if the rotation is complete.
    pub async fn finish_rotation(
        &self,
        current: &SessionKeyHandle,
        escrow: &TemporaryKeyEscrow,
    ) -> Result<bool, StrongboxError> {
        let remaining = self.store.count_stale_items(current.generation()).await?;
        if remaining > 0 {
            debug!(remaining, "rotation not finished, escrow kept");
            return Ok(false);
        }
        if let Some(status) = escrow.status().await? {
            if status.generation < current.generation() {
                escrow.clear(status.issued_at).await?;
            } else {
                debug!(
                    escrow_generation = status.generation,
                    "escrow belongs to a newer rotation, kept"
                );
            }
        }
        Ok(true)
    }
}
