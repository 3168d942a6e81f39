// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session holder of an unwrapped master key.

use zeroize::Zeroizing;

use crate::kdf::KEY_LEN;

/// The master key of one generation, unlocked for one session.
///
/// Never serialized, never cloned. The key bytes are zeroed when the handle
/// drops; call [`close`](Self::close) at logout to make that explicit.
pub struct SessionKeyHandle {
    key: Zeroizing<[u8; KEY_LEN]>,
    generation: i64,
}

impl SessionKeyHandle {
    pub(crate) fn new(key: Zeroizing<[u8; KEY_LEN]>, generation: i64) -> Self {
        Self { key, generation }
    }

    pub(crate) fn from_slice(bytes: &[u8], generation: i64) -> Option<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self::new(Zeroizing::new(array), generation))
    }

    pub(crate) fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// The master key generation this handle unlocks.
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// End the session, zeroing the key.
    pub fn close(self) {}
}

impl std::fmt::Debug for SessionKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyHandle")
            .field("key", &"[REDACTED]")
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_key() {
        let handle = SessionKeyHandle::new(Zeroizing::new([0x42; KEY_LEN]), 3);
        let out = format!("{handle:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("generation: 3"));
        assert!(!out.contains("66"));
    }

    #[test]
    fn from_slice_requires_exact_key_length() {
        assert!(SessionKeyHandle::from_slice(&[1u8; 31], 1).is_none());
        assert!(SessionKeyHandle::from_slice(&[1u8; 33], 1).is_none());
        let handle = SessionKeyHandle::from_slice(&[1u8; 32], 7).unwrap();
        assert_eq!(handle.generation(), 7);
        assert_eq!(handle.key(), &[1u8; 32]);
    }
}
