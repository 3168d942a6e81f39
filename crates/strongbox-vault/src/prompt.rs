// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret acquisition via TTY prompt or environment variable.

use secrecy::SecretString;
use strongbox_core::StrongboxError;

/// Current master password, for headless use.
pub const MASTER_PASSWORD_ENV_VAR: &str = "STRONGBOX_MASTER_PASSWORD";

/// Replacement master password for `change`, for headless use.
pub const NEW_MASTER_PASSWORD_ENV_VAR: &str = "STRONGBOX_NEW_MASTER_PASSWORD";

/// Ephemeral escrow secret for `recover`, for headless use.
pub const RECOVERY_SECRET_ENV_VAR: &str = "STRONGBOX_RECOVERY_SECRET";

fn from_env(env_var: &str) -> Option<SecretString> {
    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
        _ => None,
    }
}

fn read_tty(prompt: &str) -> Result<String, StrongboxError> {
    eprint!("{prompt}: ");
    rpassword::read_password()
        .map_err(|e| StrongboxError::Config(format!("failed to read secret: {e}")))
}

fn no_source(env_var: &str) -> StrongboxError {
    StrongboxError::Config(format!(
        "no secret provided. Set {env_var} or run interactively."
    ))
}

/// Read a secret from `env_var`, or prompt for it on a terminal.
pub fn read_secret(env_var: &str, prompt: &str) -> Result<SecretString, StrongboxError> {
    if let Some(secret) = from_env(env_var) {
        return Ok(secret);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let value = read_tty(prompt)?;
        if value.is_empty() {
            return Err(StrongboxError::Config("empty secret not allowed".to_string()));
        }
        return Ok(SecretString::from(value));
    }

    Err(no_source(env_var))
}

/// Read a new secret, prompting twice on a terminal.
///
/// The environment variable needs no confirmation.
pub fn read_new_secret(env_var: &str, prompt: &str) -> Result<SecretString, StrongboxError> {
    if let Some(secret) = from_env(env_var) {
        return Ok(secret);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let first = read_tty(prompt)?;
        let second = read_tty(&format!("Confirm {}", prompt.to_lowercase()))?;
        if first != second {
            return Err(StrongboxError::Config("secrets do not match".to_string()));
        }
        if first.is_empty() {
            return Err(StrongboxError::Config("empty secret not allowed".to_string()));
        }
        return Ok(SecretString::from(first));
    }

    Err(no_source(env_var))
}
