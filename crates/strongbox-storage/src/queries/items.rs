// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted item field operations.

use rusqlite::{OptionalExtension, params};
use strongbox_core::{EncryptedSecret, ItemSecret, StrongboxError};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

fn item_from_row(row: &rusqlite::Row<'_>) -> Result<ItemSecret, rusqlite::Error> {
    Ok(ItemSecret {
        item_id: row.get(0)?,
        field: row.get(1)?,
        secret: EncryptedSecret::new(row.get(2)?, row.get(3)?),
        generation: row.get(4)?,
        updated_at: from_millis(5, row.get(5)?)?,
    })
}

pub async fn load_item_secret(
    db: &Database,
    item_id: &str,
    field: &str,
) -> Result<Option<ItemSecret>, StrongboxError> {
    let item_id = item_id.to_string();
    let field = field.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT item_id, field, ciphertext, iv, generation, updated_at
                 FROM item_secrets WHERE item_id = ?1 AND field = ?2",
                params![item_id, field],
                item_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite one item field.
pub async fn store_item_secret(db: &Database, item: &ItemSecret) -> Result<(), StrongboxError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO item_secrets (item_id, field, ciphertext, iv, generation, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(item_id, field) DO UPDATE SET
                     ciphertext = excluded.ciphertext,
                     iv = excluded.iv,
                     generation = excluded.generation,
                     updated_at = excluded.updated_at",
                params![
                    item.item_id,
                    item.field,
                    item.secret.ciphertext,
                    item.secret.iv,
                    item.generation,
                    to_millis(item.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite one item field, but only while the master envelope is
/// still at `item.generation`. Returns `false` if nothing was written.
pub async fn store_current_item_secret(
    db: &Database,
    item: &ItemSecret,
) -> Result<bool, StrongboxError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO item_secrets (item_id, field, ciphertext, iv, generation, updated_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE EXISTS (
                     SELECT 1 FROM master_envelope WHERE id = 1 AND generation = ?5
                 )
                 ON CONFLICT(item_id, field) DO UPDATE SET
                     ciphertext = excluded.ciphertext,
                     iv = excluded.iv,
                     generation = excluded.generation,
                     updated_at = excluded.updated_at",
                params![
                    item.item_id,
                    item.field,
                    item.secret.ciphertext,
                    item.secret.iv,
                    item.generation,
                    to_millis(item.updated_at),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_item_secret(
    db: &Database,
    item_id: &str,
    field: &str,
) -> Result<bool, StrongboxError> {
    let item_id = item_id.to_string();
    let field = field.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM item_secrets WHERE item_id = ?1 AND field = ?2",
                params![item_id, field],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Up to `limit` items still encrypted under `generation`, oldest first.
pub async fn list_items_by_generation(
    db: &Database,
    generation: i64,
    limit: usize,
) -> Result<Vec<ItemSecret>, StrongboxError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, field, ciphertext, iv, generation, updated_at
                 FROM item_secrets WHERE generation = ?1
                 ORDER BY updated_at ASC, item_id ASC, field ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![generation, limit], item_from_row)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_stale_items(db: &Database, current: i64) -> Result<u64, StrongboxError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM item_secrets WHERE generation < ?1",
                params![current],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map_err(map_tr_err)
        .map(|count| u64::try_from(count).unwrap_or(0))
}

/// Overwrite an item only if it still holds `expected`'s generation and ciphertext.
pub async fn replace_item_secret(
    db: &Database,
    expected: &ItemSecret,
    replacement: &ItemSecret,
) -> Result<bool, StrongboxError> {
    let expected = expected.clone();
    let replacement = replacement.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE item_secrets
                 SET ciphertext = ?3, iv = ?4, generation = ?5, updated_at = ?6
                 WHERE item_id = ?1 AND field = ?2
                   AND generation = ?7 AND ciphertext = ?8 AND iv = ?9",
                params![
                    expected.item_id,
                    expected.field,
                    replacement.secret.ciphertext,
                    replacement.secret.iv,
                    replacement.generation,
                    to_millis(replacement.updated_at),
                    expected.generation,
                    expected.secret.ciphertext,
                    expected.secret.iv,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use strongbox_core::{HashRecord, MasterKeyEnvelope};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("items.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, minute, 0).unwrap()
    }

    fn item(item_id: &str, field: &str, generation: i64, minute: u32) -> ItemSecret {
        ItemSecret {
            item_id: item_id.to_string(),
            field: field.to_string(),
            secret: EncryptedSecret::new(vec![generation as u8; 48], vec![7; 16]),
            generation,
            updated_at: at(minute),
        }
    }

    #[tokio::test]
    async fn store_load_delete() {
        let (db, _dir) = setup_db().await;
        let secret = item("acct-1", "password", 1, 0);
        store_item_secret(&db, &secret).await.unwrap();
        assert_eq!(
            load_item_secret(&db, "acct-1", "password").await.unwrap(),
            Some(secret)
        );
        assert!(
            load_item_secret(&db, "acct-1", "pin")
                .await
                .unwrap()
                .is_none()
        );
        assert!(delete_item_secret(&db, "acct-1", "password").await.unwrap());
        assert!(!delete_item_secret(&db, "acct-1", "password").await.unwrap());
    }

    #[tokio::test]
    async fn empty_secret_is_stored_as_empty_blobs() {
        let (db, _dir) = setup_db().await;
        let mut secret = item("acct-2", "notes", 1, 0);
        secret.secret = EncryptedSecret::empty();
        store_item_secret(&db, &secret).await.unwrap();

        let stored = load_item_secret(&db, "acct-2", "notes").await.unwrap().unwrap();
        assert!(stored.secret.is_empty());
    }

    #[tokio::test]
    async fn current_write_requires_matching_envelope_generation() {
        let (db, _dir) = setup_db().await;
        assert!(!store_current_item_secret(&db, &item("a", "password", 1, 0)).await.unwrap());

        let envelope = MasterKeyEnvelope {
            verification_hash: HashRecord::from_bytes(vec![0x02, 1]),
            key_salt: vec![2; 16],
            generation: 2,
            updated_at: at(0),
        };
        crate::queries::envelope::create_envelope(&db, &envelope).await.unwrap();

        assert!(!store_current_item_secret(&db, &item("a", "password", 1, 1)).await.unwrap());
        assert!(load_item_secret(&db, "a", "password").await.unwrap().is_none());

        let current = item("a", "password", 2, 2);
        assert!(store_current_item_secret(&db, &current).await.unwrap());
        let overwrite = item("a", "password", 2, 3);
        assert!(store_current_item_secret(&db, &overwrite).await.unwrap());
        assert_eq!(
            load_item_secret(&db, "a", "password").await.unwrap(),
            Some(overwrite)
        );
    }

    #[tokio::test]
    async fn list_by_generation_is_oldest_first_and_limited() {
        let (db, _dir) = setup_db().await;
        store_item_secret(&db, &item("c", "password", 1, 30)).await.unwrap();
        store_item_secret(&db, &item("a", "password", 1, 10)).await.unwrap();
        store_item_secret(&db, &item("b", "password", 1, 20)).await.unwrap();
        store_item_secret(&db, &item("d", "password", 2, 0)).await.unwrap();

        let batch = list_items_by_generation(&db, 1, 2).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stale_count_covers_all_older_generations() {
        let (db, _dir) = setup_db().await;
        store_item_secret(&db, &item("a", "password", 1, 0)).await.unwrap();
        store_item_secret(&db, &item("b", "password", 2, 0)).await.unwrap();
        store_item_secret(&db, &item("c", "password", 3, 0)).await.unwrap();

        assert_eq!(count_stale_items(&db, 3).await.unwrap(), 2);
        assert_eq!(count_stale_items(&db, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_is_guarded_by_previous_row() {
        let (db, _dir) = setup_db().await;
        let original = item("a", "password", 1, 0);
        store_item_secret(&db, &original).await.unwrap();

        let rewritten = item("a", "password", 2, 5);
        assert!(!replace_item_secret(&db, &rewritten, &rewritten).await.unwrap());
        assert!(replace_item_secret(&db, &original, &rewritten).await.unwrap());
        assert!(!replace_item_secret(&db, &original, &rewritten).await.unwrap());

        let stored = load_item_secret(&db, "a", "password").await.unwrap().unwrap();
        assert_eq!(stored, rewritten);
    }

    #[tokio::test]
    async fn replace_loses_to_concurrent_write_at_same_generation() {
        let (db, _dir) = setup_db().await;
        let original = item("a", "password", 1, 0);
        store_item_secret(&db, &original).await.unwrap();

        let mut concurrent = original.clone();
        concurrent.secret = EncryptedSecret::new(vec![0xEE; 48], vec![8; 16]);
        store_item_secret(&db, &concurrent).await.unwrap();

        assert!(
            !replace_item_secret(&db, &original, &item("a", "password", 2, 5))
                .await
                .unwrap()
        );
        let stored = load_item_secret(&db, "a", "password").await.unwrap().unwrap();
        assert_eq!(stored, concurrent);
    }

    #[tokio::test]
    async fn replace_of_deleted_item_does_not_resurrect_it() {
        let (db, _dir) = setup_db().await;
        let original = item("a", "password", 1, 0);
        store_item_secret(&db, &original).await.unwrap();
        delete_item_secret(&db, "a", "password").await.unwrap();

        assert!(
            !replace_item_secret(&db, &original, &item("a", "password", 2, 5))
                .await
                .unwrap()
        );
        assert!(load_item_secret(&db, "a", "password").await.unwrap().is_none());
    }
}
