// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the symmetric cipher.

use std::sync::Arc;

use proptest::prelude::*;
use strongbox_core::StrongboxError;
use strongbox_vault::{CipherContext, SystemRandomSource};

fn cipher() -> CipherContext {
    CipherContext::initialize(Arc::new(SystemRandomSource::new())).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn decrypt_inverts_encrypt(
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        key in any::<[u8; 32]>(),
    ) {
        let ctx = cipher();
        let sealed = ctx.encrypt(&plaintext, &key).unwrap();
        let opened = ctx.decrypt(&sealed.ciphertext, &sealed.iv, &key).unwrap();
        prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn repeated_encryption_never_reuses_iv(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        key in any::<[u8; 32]>(),
    ) {
        let ctx = cipher();
        let a = ctx.encrypt(&plaintext, &key).unwrap();
        let b = ctx.encrypt(&plaintext, &key).unwrap();
        prop_assert_ne!(&a.iv, &b.iv);
        prop_assert_ne!(&a.ciphertext, &b.ciphertext);
    }

    #[test]
    fn wrong_key_never_yields_plaintext(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        k1 in any::<[u8; 32]>(),
        k2 in any::<[u8; 32]>(),
    ) {
        prop_assume!(k1 != k2);
        let ctx = cipher();
        let sealed = ctx.encrypt(&plaintext, &k1).unwrap();
        match ctx.decrypt(&sealed.ciphertext, &sealed.iv, &k2) {
            Err(StrongboxError::DecryptionFailed) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
            Ok(opened) => prop_assert_ne!(opened.as_slice(), plaintext.as_slice()),
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected(
        plaintext in proptest::collection::vec(any::<u8>(), 1..128),
        key in any::<[u8; 32]>(),
        flip in any::<prop::sample::Index>(),
    ) {
        let ctx = cipher();
        let mut sealed = ctx.encrypt(&plaintext, &key).unwrap();
        let at = flip.index(sealed.ciphertext.len());
        sealed.ciphertext[at] ^= 0x01;
        prop_assert!(matches!(
            ctx.decrypt(&sealed.ciphertext, &sealed.iv, &key),
            Err(StrongboxError::DecryptionFailed)
        ));
    }
}

#[test]
fn empty_plaintext_encrypts_to_empty_pair() {
    let ctx = cipher();
    let sealed = ctx.encrypt(b"", &[3u8; 32]).unwrap();
    assert!(sealed.ciphertext.is_empty());
    assert!(sealed.iv.is_empty());
    assert!(ctx.decrypt(b"", b"", &[3u8; 32]).unwrap().is_empty());
}
