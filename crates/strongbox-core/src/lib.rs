// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Strongbox credential vault.
//!
//! This crate provides the error taxonomy, the persisted domain types, and the
//! [`KeyStore`] trait the key-management core uses to reach storage.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{GENERIC_AUTH_FAILURE, StrongboxError};
pub use traits::KeyStore;
pub use types::{
    EncryptedSecret, EscrowRecord, EscrowStatus, HashRecord, HashVersion, IV_LEN, ItemSecret,
    KdfParams, MasterKeyEnvelope, MasterKeyState, UserKeyWrap,
};
