// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-CBC encrypt/decrypt with an explicit per-call IV.
//!
//! Every call to [`CipherContext::encrypt`] draws a fresh 16-byte IV from the
//! context's [`RandomSource`]. Callers never supply an IV.
//!
//! Layout of a stored ciphertext:
//!
//! ```text
//! AES-256-CBC(enc_key, iv, PKCS#7(plaintext)) || HMAC-SHA256(mac_key, iv || body)
//! ```
//!
//! `enc_key` and `mac_key` are expanded from the caller's 32-byte key with
//! HKDF-SHA256, so a wrong key fails the tag check and never yields
//! plaintext-shaped garbage.

use std::sync::Arc;

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::{hkdf, hmac};
use strongbox_core::{EncryptedSecret, IV_LEN, StrongboxError};
use tracing::debug;
use zeroize::Zeroizing;

use crate::kdf::{self, KEY_LEN};
use crate::random::{RandomSource, random_array};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the HMAC-SHA256 tag appended to every ciphertext.
pub const TAG_LEN: usize = 32;

const BLOCK_LEN: usize = 16;

const HKDF_SALT: &[u8] = b"strongbox:aes-256-cbc-hmac-sha256";
const ENC_INFO: &[u8] = b"strongbox:enc";
const MAC_INFO: &[u8] = b"strongbox:mac";

// NIST SP 800-38A, F.2.5 CBC-AES256.Encrypt, block #1.
const KAT_KEY: [u8; 32] = [
    0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77,
    0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14,
    0xdf, 0xf4,
];
const KAT_IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f,
];
const KAT_PLAINTEXT: [u8; 16] = [
    0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
    0x2a,
];
const KAT_CIPHERTEXT: [u8; 16] = [
    0xf5, 0x8c, 0x4c, 0x04, 0xd6, 0xe5, 0xf1, 0xba, 0x77, 0x9e, 0xab, 0xfb, 0x5f, 0x7b, 0xfb,
    0xd6,
];

struct SubKeys {
    enc: Zeroizing<[u8; KEY_LEN]>,
    mac: hmac::Key,
}

fn expand(
    prk: &hkdf::Prk,
    info: &'static [u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, StrongboxError> {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    prk.expand(&[info], hkdf::HKDF_SHA256)
        .and_then(|okm| okm.fill(out.as_mut()))
        .map_err(|_| StrongboxError::Internal("HKDF expansion failed".to_string()))?;
    Ok(out)
}

fn split_key(key: &[u8; KEY_LEN]) -> Result<SubKeys, StrongboxError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT).extract(key);
    let enc = expand(&prk, ENC_INFO)?;
    let mac = expand(&prk, MAC_INFO)?;
    Ok(SubKeys {
        enc,
        mac: hmac::Key::new(hmac::HMAC_SHA256, mac.as_ref()),
    })
}

fn signed_bytes(iv: &[u8], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(iv.len() + body.len());
    data.extend_from_slice(iv);
    data.extend_from_slice(body);
    data
}

/// A validated handle to the block cipher.
///
/// Built once at startup by [`CipherContext::initialize`], which runs a
/// known-answer test; a context that exists has passed it.
#[derive(Clone)]
pub struct CipherContext {
    rng: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext").finish_non_exhaustive()
    }
}

impl CipherContext {
    /// Self-test the cipher and return a context bound to `rng`.
    ///
    /// Fails with [`StrongboxError::CipherUnavailable`] if the primitive is
    /// broken or the random source cannot produce a test key.
    pub fn initialize(rng: Arc<dyn RandomSource>) -> Result<Self, StrongboxError> {
        let ctx = Self { rng };
        ctx.self_test().map_err(StrongboxError::CipherUnavailable)?;
        debug!("cipher self-test passed");
        Ok(ctx)
    }

    fn self_test(&self) -> Result<(), String> {
        let block = Aes256CbcEnc::new_from_slices(&KAT_KEY, &KAT_IV)
            .map_err(|e| format!("cannot key AES-256-CBC: {e}"))?
            .encrypt_padded_vec_mut::<NoPadding>(&KAT_PLAINTEXT);
        if block != KAT_CIPHERTEXT {
            return Err("AES-256-CBC known-answer test failed".to_string());
        }

        let key: [u8; KEY_LEN] =
            random_array(self.rng.as_ref()).map_err(|e| format!("self-test key: {e}"))?;
        let sample = b"strongbox cipher self-test";
        let sealed = self
            .encrypt(sample, &key)
            .map_err(|e| format!("self-test encrypt: {e}"))?;
        let opened = self
            .decrypt(&sealed.ciphertext, &sealed.iv, &key)
            .map_err(|e| format!("self-test decrypt: {e}"))?;
        if opened.as_slice() != sample {
            return Err("round-trip self-test returned different bytes".to_string());
        }
        Ok(())
    }

    /// The random source IVs are drawn from. Shared with salt generation.
    pub fn rng(&self) -> &dyn RandomSource {
        self.rng.as_ref()
    }

    /// Encrypt `plaintext` under `key` with a fresh random IV.
    ///
    /// The empty plaintext encrypts to the empty secret (no ciphertext, no IV).
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8; KEY_LEN],
    ) -> Result<EncryptedSecret, StrongboxError> {
        if plaintext.is_empty() {
            return Ok(EncryptedSecret::empty());
        }

        let iv: [u8; IV_LEN] = random_array(self.rng.as_ref())?;
        let keys = split_key(key)?;
        let mut ciphertext = Aes256CbcEnc::new_from_slices(keys.enc.as_ref(), &iv)
            .map_err(|e| StrongboxError::Internal(format!("cannot key AES-256-CBC: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let tag = hmac::sign(&keys.mac, &signed_bytes(&iv, &ciphertext));
        ciphertext.extend_from_slice(tag.as_ref());
        Ok(EncryptedSecret::new(ciphertext, iv.to_vec()))
    }

    /// Decrypt a ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// Malformed input, a tampered tag and a wrong key all fail with
    /// [`StrongboxError::DecryptionFailed`]. Padding is removed exactly, so
    /// trailing whitespace in the original plaintext survives.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        key: &[u8; KEY_LEN],
    ) -> Result<Zeroizing<Vec<u8>>, StrongboxError> {
        if ciphertext.is_empty() && iv.is_empty() {
            return Ok(Zeroizing::new(Vec::new()));
        }
        if iv.len() != IV_LEN
            || ciphertext.len() < BLOCK_LEN + TAG_LEN
            || (ciphertext.len() - TAG_LEN) % BLOCK_LEN != 0
        {
            return Err(StrongboxError::DecryptionFailed);
        }

        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        let keys = split_key(key)?;
        hmac::verify(&keys.mac, &signed_bytes(iv, body), tag)
            .map_err(|_| StrongboxError::DecryptionFailed)?;

        let plaintext = Aes256CbcDec::new_from_slices(keys.enc.as_ref(), iv)
            .map_err(|_| StrongboxError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| StrongboxError::DecryptionFailed)?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Decrypt an [`EncryptedSecret`].
    pub fn decrypt_secret(
        &self,
        secret: &EncryptedSecret,
        key: &[u8; KEY_LEN],
    ) -> Result<Zeroizing<Vec<u8>>, StrongboxError> {
        self.decrypt(&secret.ciphertext, &secret.iv, key)
    }

    /// Turn a human-supplied secret into a 32-byte key. See [`kdf::derive_key`].
    pub fn derive_key(
        &self,
        secret: &[u8],
        key_salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, StrongboxError> {
        kdf::derive_key(secret, key_salt)
    }
}
