// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Strongbox.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level Strongbox configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StrongboxConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key derivation and password hashing settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Temporary key escrow settings.
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// RSA transport settings for client-encrypted values.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("strongbox").join("strongbox.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("strongbox.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Argon2id parameters shared by key derivation and password hashing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

/// Temporary key escrow configuration.
///
/// The attempt limit is a compiled constant, not a setting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscrowConfig {
    /// Seconds an escrow stays recoverable after issue (default: 86400).
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

fn default_max_lifetime_secs() -> u64 {
    86_400
}

/// RSA padding used to decrypt client-submitted values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RsaPadding {
    /// RSA-OAEP with SHA-256.
    #[default]
    Oaep,
    /// PKCS#1 v1.5, for clients that cannot do OAEP.
    Pkcs1v15,
}

/// RSA transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Directory holding the public and private key PEM files.
    #[serde(default = "default_key_dir")]
    pub key_dir: String,

    /// Modulus size used when the key pair is first generated.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,

    /// Padding scheme expected from clients.
    #[serde(default)]
    pub padding: RsaPadding,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            key_dir: default_key_dir(),
            key_bits: default_key_bits(),
            padding: RsaPadding::default(),
        }
    }
}

fn default_key_dir() -> String {
    dirs::config_dir()
        .map(|p| p.join("strongbox").join("keys"))
        .unwrap_or_else(|| std::path::PathBuf::from("keys"))
        .to_string_lossy()
        .into_owned()
}

fn default_key_bits() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StrongboxConfig::default();
        assert_eq!(config.logging.log_level, "info");
        assert!(config.storage.wal_mode);
        assert!(config.storage.database_path.ends_with("strongbox.db"));
        assert_eq!(config.vault.kdf_memory_cost, 65536);
        assert_eq!(config.vault.kdf_iterations, 3);
        assert_eq!(config.vault.kdf_parallelism, 4);
        assert_eq!(config.escrow.max_lifetime_secs, 86_400);
        assert_eq!(config.transport.key_bits, 1024);
        assert_eq!(config.transport.padding, RsaPadding::Oaep);
    }

    #[test]
    fn padding_parses_snake_case() {
        let parsed: TransportConfig = toml::from_str("padding = \"pkcs1v15\"").unwrap();
        assert_eq!(parsed.padding, RsaPadding::Pkcs1v15);
    }
}
