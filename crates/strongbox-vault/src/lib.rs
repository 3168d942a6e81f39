// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key management and encryption core for the Strongbox credential vault.
//!
//! Item secrets are encrypted with AES-256-CBC (plus an HMAC-SHA256 tag) under
//! a key derived from the master password via Argon2id. During a master
//! password change the previous key stays recoverable through a time-boxed,
//! attempt-limited escrow until every item has been re-encrypted. Short values
//! submitted by clients can be RSA-encrypted against a server key pair.

pub mod cipher;
pub mod codec;
pub mod envelope;
pub mod escrow;
pub mod hasher;
pub mod kdf;
pub mod prompt;
pub mod random;
pub mod rekey;
pub mod session;
pub mod startup;
pub mod transport;
pub mod users;

pub use cipher::CipherContext;
pub use codec::VaultCodec;
pub use envelope::{MasterKeyLifecycle, MasterKeyRotation};
pub use escrow::{MAX_ESCROW_ATTEMPTS, TemporaryKeyEscrow};
pub use hasher::PasswordHasher;
pub use prompt::{read_new_secret, read_secret};
pub use random::{RandomSource, SystemRandomSource};
pub use rekey::{RekeyReport, Rekeyer};
pub use session::SessionKeyHandle;
pub use startup::{StartupReport, vault_startup_check};
pub use transport::AsymmetricTransport;
pub use users::UserKeyring;
