// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the collaborators the key-management core consumes.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod store;

pub use store::KeyStore;
