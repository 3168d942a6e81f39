// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RSA key pair on disk for decrypting client-encrypted values.
//!
//! A client encrypts a short sensitive value (a typed password) under
//! [`AsymmetricTransport::public_key_pem`] before it goes into a request body.
//! Only this process holds the private key.
//!
//! Both files live in `transport.key_dir`. The private key is PKCS#8 PEM and
//! is created with mode 0600 on Unix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use strongbox_config::model::{RsaPadding, TransportConfig};
use strongbox_core::StrongboxError;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const PUBLIC_KEY_FILE: &str = "public.pem";
pub const PRIVATE_KEY_FILE: &str = "private.pem";

#[derive(Debug, Clone)]
pub struct AsymmetricTransport {
    key_dir: PathBuf,
    key_bits: usize,
    padding: RsaPadding,
}

impl AsymmetricTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            key_dir: PathBuf::from(&config.key_dir),
            key_bits: config.key_bits,
            padding: config.padding,
        }
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_dir.join(PUBLIC_KEY_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_dir.join(PRIVATE_KEY_FILE)
    }

    /// The padding [`decrypt`](Self::decrypt) expects.
    pub fn padding(&self) -> RsaPadding {
        self.padding
    }

    /// Whether both key files exist.
    pub fn has_key_pair(&self) -> bool {
        self.public_key_path().is_file() && self.private_key_path().is_file()
    }

    /// Generate and write a key pair unless both files already exist.
    ///
    /// Returns `true` if a new pair was written. A lone surviving file is
    /// overwritten; this is bootstrap, not rotation.
    pub fn ensure_key_pair(&self) -> Result<bool, StrongboxError> {
        if self.has_key_pair() {
            return Ok(false);
        }

        fs::create_dir_all(&self.key_dir).map_err(|e| {
            StrongboxError::Transport(format!(
                "cannot create key directory {}: {e}",
                self.key_dir.display()
            ))
        })?;

        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, self.key_bits)
            .map_err(|e| StrongboxError::Transport(format!("RSA key generation failed: {e}")))?;
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| StrongboxError::Transport(format!("cannot encode private key: {e}")))?;
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| StrongboxError::Transport(format!("cannot encode public key: {e}")))?;

        write_private(&self.private_key_path(), private_pem.as_bytes())?;
        fs::write(self.public_key_path(), public_pem.as_bytes()).map_err(|e| {
            StrongboxError::Transport(format!(
                "cannot write {}: {e}",
                self.public_key_path().display()
            ))
        })?;

        info!(
            event = "transport_keys_generated",
            key_dir = %self.key_dir.display(),
            bits = self.key_bits,
            "RSA transport key pair generated"
        );
        Ok(true)
    }

    /// The public key as SPKI PEM, generating the pair on first use.
    pub fn public_key_pem(&self) -> Result<String, StrongboxError> {
        self.ensure_key_pair()?;
        let path = self.public_key_path();
        fs::read_to_string(&path).map_err(|_| StrongboxError::KeyMaterialMissing {
            path: path.display().to_string(),
        })
    }

    /// Decrypt a client-encrypted value with the configured padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, StrongboxError> {
        self.decrypt_with(self.padding, ciphertext)
    }

    /// Decrypt with an explicit padding scheme.
    ///
    /// A missing or unreadable private key is `KeyMaterialMissing` (fatal); a
    /// bad ciphertext is `DecryptionFailed` (recoverable).
    pub fn decrypt_with(
        &self,
        padding: RsaPadding,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, StrongboxError> {
        let private = self.load_private_key()?;
        let plaintext = match padding {
            RsaPadding::Oaep => private.decrypt(Oaep::new::<Sha256>(), ciphertext),
            RsaPadding::Pkcs1v15 => private.decrypt(Pkcs1v15Encrypt, ciphertext),
        }
        .map_err(|_| StrongboxError::DecryptionFailed)?;
        debug!(?padding, "client value decrypted");
        Ok(Zeroizing::new(plaintext))
    }

    fn load_private_key(&self) -> Result<RsaPrivateKey, StrongboxError> {
        let path = self.private_key_path();
        let missing = || StrongboxError::KeyMaterialMissing {
            path: path.display().to_string(),
        };
        let pem = Zeroizing::new(fs::read_to_string(&path).map_err(|_| missing())?);
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|_| missing())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), StrongboxError> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let err = |e: std::io::Error| {
        StrongboxError::Transport(format!("cannot write {}: {e}", path.display()))
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(err)?;
    // mode() only applies on creation; tighten a pre-existing file too.
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(err)?;
    file.write_all(contents).map_err(err)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), StrongboxError> {
    let mut file = fs::File::create(path).map_err(|e| {
        StrongboxError::Transport(format!("cannot write {}: {e}", path.display()))
    })?;
    file.write_all(contents).map_err(|e| {
        StrongboxError::Transport(format!("cannot write {}: {e}", path.display()))
    })
}
