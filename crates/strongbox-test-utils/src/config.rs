// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration fixtures.

use strongbox_config::model::{StorageConfig, StrongboxConfig, TransportConfig, VaultConfig};

/// A config with the cheapest Argon2id settings validation accepts.
///
/// Storage and key paths point at the current directory; use [`TestEnv`] when
/// the test touches the filesystem.
pub fn test_config() -> StrongboxConfig {
    StrongboxConfig {
        vault: VaultConfig {
            kdf_memory_cost: 32768,
            kdf_iterations: 2,
            kdf_parallelism: 1,
        },
        ..StrongboxConfig::default()
    }
}

/// A [`test_config`] whose database and key directory live in a temp dir.
///
/// The directory is removed when the value drops.
pub struct TestEnv {
    pub config: StrongboxConfig,
    pub dir: tempfile::TempDir,
}

impl TestEnv {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut config = test_config();
        config.storage = StorageConfig {
            database_path: dir.path().join("vault.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        config.transport = TransportConfig {
            key_dir: dir.path().join("keys").to_string_lossy().into_owned(),
            ..TransportConfig::default()
        };
        Ok(Self { config, dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_paths_live_in_temp_dir() {
        let env = TestEnv::new().unwrap();
        let root = env.dir.path().to_string_lossy().into_owned();
        assert!(env.config.storage.database_path.starts_with(&root));
        assert!(env.config.transport.key_dir.starts_with(&root));
        assert_eq!(env.config.vault.kdf_parallelism, 1);
    }
}
