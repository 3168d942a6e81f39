// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temporary key escrow operations.
//!
//! At most one escrow exists. The attempt counter is only ever changed by a
//! single `UPDATE ... RETURNING`, so racing recoveries can neither lose an
//! attempt nor claim more than the limit. Every write after the first is keyed
//! on `issued_at`, so it never touches an escrow installed since the read.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use strongbox_core::{EncryptedSecret, EscrowRecord, HashRecord, StrongboxError};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

/// Insert or replace the escrow row. Usable inside a transaction.
pub(crate) fn upsert_escrow(
    conn: &rusqlite::Connection,
    escrow: &EscrowRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO key_escrow
             (id, wrapped_key, wrapped_iv, wrap_salt, verification_hash,
              generation, issued_at, expires_at, attempt_count)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            escrow.wrapped_master_key.ciphertext,
            escrow.wrapped_master_key.iv,
            escrow.wrap_salt,
            escrow.verification_hash.as_bytes(),
            escrow.generation,
            to_millis(escrow.issued_at),
            to_millis(escrow.expires_at),
            escrow.attempt_count,
        ],
    )?;
    Ok(())
}

pub async fn load_escrow(db: &Database) -> Result<Option<EscrowRecord>, StrongboxError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT wrapped_key, wrapped_iv, wrap_salt, verification_hash,
                        generation, issued_at, expires_at, attempt_count
                 FROM key_escrow WHERE id = 1",
                [],
                |row| {
                    Ok(EscrowRecord {
                        wrapped_master_key: EncryptedSecret::new(row.get(0)?, row.get(1)?),
                        wrap_salt: row.get(2)?,
                        verification_hash: HashRecord::from_bytes(row.get(3)?),
                        generation: row.get(4)?,
                        issued_at: from_millis(5, row.get(5)?)?,
                        expires_at: from_millis(6, row.get(6)?)?,
                        attempt_count: row.get(7)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn store_escrow(db: &Database, escrow: &EscrowRecord) -> Result<(), StrongboxError> {
    let escrow = escrow.clone();
    db.connection()
        .call(move |conn| upsert_escrow(conn, &escrow))
        .await
        .map_err(map_tr_err)
}

/// Reserve one attempt on the escrow issued at `issued_at`.
///
/// Returns the new count, or `None` if no such escrow exists or it already
/// has `max_attempts` attempts.
pub async fn claim_escrow_attempt(
    db: &Database,
    issued_at: DateTime<Utc>,
    max_attempts: u32,
) -> Result<Option<u32>, StrongboxError> {
    let issued_at = to_millis(issued_at);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE key_escrow SET attempt_count = attempt_count + 1
                 WHERE id = 1 AND issued_at = ?1 AND attempt_count < ?2
                 RETURNING attempt_count",
                params![issued_at, max_attempts],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Give back an attempt reserved by a successful recovery.
pub async fn release_escrow_attempt(
    db: &Database,
    issued_at: DateTime<Utc>,
) -> Result<(), StrongboxError> {
    let issued_at = to_millis(issued_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE key_escrow SET attempt_count = attempt_count - 1
                 WHERE id = 1 AND issued_at = ?1 AND attempt_count > 0",
                params![issued_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the escrow issued at `issued_at`. Returns `false` if it is not the stored one.
pub async fn clear_escrow(db: &Database, issued_at: DateTime<Utc>) -> Result<bool, StrongboxError> {
    let issued_at = to_millis(issued_at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM key_escrow WHERE id = 1 AND issued_at = ?1",
                params![issued_at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
