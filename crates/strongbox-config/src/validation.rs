// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::StrongboxConfig;

/// Smallest Argon2id memory cost accepted, in KiB.
pub const MIN_KDF_MEMORY_COST: u32 = 32768;

/// Smallest RSA modulus accepted for the transport key pair.
pub const MIN_RSA_KEY_BITS: usize = 1024;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &StrongboxConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.logging.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.log_level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.logging.log_level
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.vault.kdf_memory_cost < MIN_KDF_MEMORY_COST {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_memory_cost must be at least {MIN_KDF_MEMORY_COST} (32 MiB), got {}",
                config.vault.kdf_memory_cost
            ),
        });
    }

    if config.vault.kdf_iterations < 2 {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_iterations must be at least 2, got {}",
                config.vault.kdf_iterations
            ),
        });
    }

    if config.vault.kdf_parallelism < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "vault.kdf_parallelism must be at least 1, got {}",
                config.vault.kdf_parallelism
            ),
        });
    }

    if config.escrow.max_lifetime_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "escrow.max_lifetime_secs must be greater than 0".to_string(),
        });
    }

    if config.transport.key_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "transport.key_dir must not be empty".to_string(),
        });
    }

    let bits = config.transport.key_bits;
    if bits < MIN_RSA_KEY_BITS || bits % 256 != 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "transport.key_bits must be a multiple of 256 and at least {MIN_RSA_KEY_BITS}, got {bits}"
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&StrongboxConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = StrongboxConfig::default();
        config.vault.kdf_memory_cost = 1024;
        config.vault.kdf_iterations = 1;
        config.escrow.max_lifetime_secs = 0;
        config.transport.key_bits = 1000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = StrongboxConfig::default();
        config.logging.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("logging.log_level"));
    }

    #[test]
    fn accepts_larger_rsa_keys() {
        let mut config = StrongboxConfig::default();
        config.transport.key_bits = 3072;
        assert!(validate_config(&config).is_ok());
    }
}
