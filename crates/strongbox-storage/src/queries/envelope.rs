// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master envelope operations.

use rusqlite::{OptionalExtension, params};
use strongbox_core::{EscrowRecord, HashRecord, MasterKeyEnvelope, StrongboxError};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

/// Load the singleton envelope row.
pub async fn load_envelope(db: &Database) -> Result<Option<MasterKeyEnvelope>, StrongboxError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT verification_hash, key_salt, generation, updated_at
                 FROM master_envelope WHERE id = 1",
                [],
                |row| {
                    Ok(MasterKeyEnvelope {
                        verification_hash: HashRecord::from_bytes(row.get(0)?),
                        key_salt: row.get(1)?,
                        generation: row.get(2)?,
                        updated_at: from_millis(3, row.get(3)?)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert the first envelope. Returns `AlreadyInitialized` if a row exists.
pub async fn create_envelope(
    db: &Database,
    envelope: &MasterKeyEnvelope,
) -> Result<(), StrongboxError> {
    let envelope = envelope.clone();
    let inserted = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO master_envelope
                     (id, verification_hash, key_salt, generation, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4)",
                params![
                    envelope.verification_hash.as_bytes(),
                    envelope.key_salt,
                    envelope.generation,
                    to_millis(envelope.updated_at),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(StrongboxError::AlreadyInitialized)
    }
}

/// Swap the verification hash if it still equals `expected`.
pub async fn replace_verification_hash(
    db: &Database,
    expected: &HashRecord,
    replacement: &HashRecord,
) -> Result<bool, StrongboxError> {
    let expected = expected.as_bytes().to_vec();
    let replacement = replacement.as_bytes().to_vec();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE master_envelope SET verification_hash = ?2
                 WHERE id = 1 AND verification_hash = ?1",
                params![expected, replacement],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the envelope and install the escrow in one transaction.
///
/// Returns `Conflict` if the stored generation moved since the caller read it.
pub async fn commit_rotation(
    db: &Database,
    expected_generation: i64,
    envelope: &MasterKeyEnvelope,
    escrow: &EscrowRecord,
) -> Result<(), StrongboxError> {
    let envelope = envelope.clone();
    let escrow = escrow.clone();
    let committed = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE master_envelope
                 SET verification_hash = ?1, key_salt = ?2, generation = ?3, updated_at = ?4
                 WHERE id = 1 AND generation = ?5",
                params![
                    envelope.verification_hash.as_bytes(),
                    envelope.key_salt,
                    envelope.generation,
                    to_millis(envelope.updated_at),
                    expected_generation,
                ],
            )?;
            if changed != 1 {
                // Dropping the transaction rolls it back.
                return Ok(false);
            }
            super::escrow::upsert_escrow(&tx, &escrow)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;

    if committed {
        Ok(())
    } else {
        Err(StrongboxError::Conflict(format!(
            "master envelope is no longer at generation {expected_generation}"
        )))
    }
}
