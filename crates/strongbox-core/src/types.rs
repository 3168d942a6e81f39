// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the storage and vault crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a CBC initialization vector (the AES block size).
pub const IV_LEN: usize = 16;

/// A ciphertext with the IV it was produced under.
///
/// The empty secret (`ciphertext` and `iv` both empty) is a valid value: it
/// stands for an optional field that was never filled in.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

impl EncryptedSecret {
    pub fn new(ciphertext: Vec<u8>, iv: Vec<u8>) -> Self {
        Self { ciphertext, iv }
    }

    /// The encryption of the empty string.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty() && self.iv.is_empty()
    }
}

impl std::fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

/// Argon2id cost parameters, persisted next to every salt they were used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Encoded length: three big-endian `u32`s.
    pub const ENCODED_LEN: usize = 12;

    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.memory_cost.to_be_bytes());
        out[4..8].copy_from_slice(&self.iterations.to_be_bytes());
        out[8..12].copy_from_slice(&self.parallelism.to_be_bytes());
        out
    }

    /// Decode from exactly [`Self::ENCODED_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let word =
            |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Some(Self {
            memory_cost: word(0),
            iterations: word(4),
            parallelism: word(8),
        })
    }
}

/// Layout discriminant stored as the first byte of a [`HashRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashVersion {
    /// `0x01 || salt[32] || SHA-256(salt || password)`.
    LegacySha256 = 0x01,
    /// `0x02 || params[12] || salt[16] || Argon2id(password, salt)[32]`.
    Argon2id = 0x02,
}

impl HashVersion {
    /// Total record length for this layout, tag byte included.
    pub const fn record_len(self) -> usize {
        1 + self.params_len() + self.salt_len() + 32
    }

    pub const fn params_len(self) -> usize {
        match self {
            Self::LegacySha256 => 0,
            Self::Argon2id => KdfParams::ENCODED_LEN,
        }
    }

    pub const fn salt_len(self) -> usize {
        match self {
            Self::LegacySha256 => 32,
            Self::Argon2id => 16,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::LegacySha256),
            0x02 => Some(Self::Argon2id),
            _ => None,
        }
    }
}

/// A salted one-way password hash: `tag || [params] || salt || digest`.
///
/// The bytes are opaque outside the hasher. Malformed records are representable
/// on purpose; verification treats them as a mismatch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord(Vec<u8>);

impl HashRecord {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The layout, if the tag is known and the length matches it.
    pub fn version(&self) -> Option<HashVersion> {
        let version = HashVersion::from_tag(*self.0.first()?)?;
        (self.0.len() == version.record_len()).then_some(version)
    }

    /// The Argon2id parameters the digest was computed with.
    pub fn kdf_params(&self) -> Option<KdfParams> {
        let version = self.version()?;
        if version.params_len() == 0 {
            return None;
        }
        KdfParams::from_bytes(&self.0[1..1 + version.params_len()])
    }

    /// The salt segment, if the record is well-formed.
    pub fn salt(&self) -> Option<&[u8]> {
        let version = self.version()?;
        let start = 1 + version.params_len();
        Some(&self.0[start..start + version.salt_len()])
    }

    /// The digest segment, if the record is well-formed.
    pub fn digest(&self) -> Option<&[u8]> {
        let version = self.version()?;
        Some(&self.0[1 + version.params_len() + version.salt_len()..])
    }

    pub fn is_legacy(&self) -> bool {
        self.version() == Some(HashVersion::LegacySha256)
    }
}

impl std::fmt::Debug for HashRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRecord")
            .field("version", &self.version())
            .field("len", &self.0.len())
            .finish()
    }
}

/// The deployment-wide master password record (singleton row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyEnvelope {
    /// Hash of the master password, checked before any key is derived.
    pub verification_hash: HashRecord,
    /// Salt (with its KDF parameters) that turns the master password into the
    /// 32-byte cipher key.
    pub key_salt: Vec<u8>,
    /// Incremented on every master password change.
    pub generation: i64,
    pub updated_at: DateTime<Utc>,
}

/// A wrapped copy of a previous master key, held during a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// The old master key, encrypted under a key derived from the ephemeral secret.
    pub wrapped_master_key: EncryptedSecret,
    pub wrap_salt: Vec<u8>,
    /// Hash of the ephemeral secret.
    pub verification_hash: HashRecord,
    /// Generation of the wrapped key.
    pub generation: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Failed recoveries so far. Never decreases.
    pub attempt_count: u32,
}

impl EscrowRecord {
    /// Escrow metadata with all secret material stripped.
    pub fn status(&self) -> EscrowStatus {
        EscrowStatus {
            generation: self.generation,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            attempt_count: self.attempt_count,
        }
    }
}

/// Public view of an active escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowStatus {
    pub generation: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: u32,
}

/// The master key wrapped under one user's login password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKeyWrap {
    pub user_id: String,
    pub wrapped_master_key: EncryptedSecret,
    pub wrap_salt: Vec<u8>,
    /// Generation of the master key this wrap holds.
    pub generation: i64,
    pub updated_at: DateTime<Utc>,
}

/// One encrypted field of a stored item (account password, custom field, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSecret {
    pub item_id: String,
    pub field: String,
    pub secret: EncryptedSecret,
    /// Generation of the master key the secret was encrypted under.
    pub generation: i64,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of the master password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum MasterKeyState {
    /// No master password has been set.
    Unset,
    /// A master password is active and no rotation is in progress.
    Active { generation: i64 },
    /// A rotation happened and the previous key is still held in escrow.
    Changing { generation: i64, previous: i64 },
}
