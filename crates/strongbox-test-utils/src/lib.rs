// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Strongbox.
//!
//! Provides an in-memory [`KeyStore`](strongbox_core::KeyStore) and
//! configuration helpers with cheap key-derivation settings so tests run fast.

pub mod config;
pub mod memory_store;

pub use config::{TestEnv, test_config};
pub use memory_store::MemoryKeyStore;
