// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user master key wraps.

use rusqlite::{OptionalExtension, params};
use strongbox_core::{EncryptedSecret, StrongboxError, UserKeyWrap};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

pub async fn load_user_wrap(
    db: &Database,
    user_id: &str,
) -> Result<Option<UserKeyWrap>, StrongboxError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, wrapped_key, wrapped_iv, wrap_salt, generation, updated_at
                 FROM user_key_wraps WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserKeyWrap {
                        user_id: row.get(0)?,
                        wrapped_master_key: EncryptedSecret::new(row.get(1)?, row.get(2)?),
                        wrap_salt: row.get(3)?,
                        generation: row.get(4)?,
                        updated_at: from_millis(5, row.get(5)?)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite the wrap for `wrap.user_id`.
pub async fn store_user_wrap(db: &Database, wrap: &UserKeyWrap) -> Result<(), StrongboxError> {
    let wrap = wrap.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_key_wraps
                     (user_id, wrapped_key, wrapped_iv, wrap_salt, generation, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                     wrapped_key = excluded.wrapped_key,
                     wrapped_iv = excluded.wrapped_iv,
                     wrap_salt = excluded.wrap_salt,
                     generation = excluded.generation,
                     updated_at = excluded.updated_at",
                params![
                    wrap.user_id,
                    wrap.wrapped_master_key.ciphertext,
                    wrap.wrapped_master_key.iv,
                    wrap.wrap_salt,
                    wrap.generation,
                    to_millis(wrap.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_user_wrap(db: &Database, user_id: &str) -> Result<bool, StrongboxError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM user_key_wraps WHERE user_id = ?1",
                params![user_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
