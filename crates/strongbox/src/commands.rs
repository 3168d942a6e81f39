// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.
//!
//! Secrets are read from `STRONGBOX_*` environment variables or a TTY prompt.
//! Only the recovery secret and the public key are written to stdout.

use std::sync::Arc;

use secrecy::ExposeSecret;
use strongbox_config::model::StrongboxConfig;
use strongbox_core::{KeyStore, MasterKeyState, StrongboxError};
use strongbox_storage::SqliteKeyStore;
use strongbox_vault::prompt::{
    MASTER_PASSWORD_ENV_VAR, NEW_MASTER_PASSWORD_ENV_VAR, RECOVERY_SECRET_ENV_VAR,
};
use strongbox_vault::{MAX_ESCROW_ATTEMPTS, VaultCodec, read_new_secret, read_secret};
use tracing::info;

async fn open(
    config: &StrongboxConfig,
) -> Result<(Arc<SqliteKeyStore>, VaultCodec), StrongboxError> {
    let store = Arc::new(SqliteKeyStore::open(config.storage.clone()).await?);
    let codec = VaultCodec::new(config, store.clone() as Arc<dyn KeyStore>)?;
    Ok((store, codec))
}

/// `strongbox init`
pub async fn run_init(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    if codec.state().await? != MasterKeyState::Unset {
        return Err(StrongboxError::AlreadyInitialized);
    }
    let password = read_new_secret(MASTER_PASSWORD_ENV_VAR, "New master password")?;
    let session = codec.set_master_password(&password).await?;
    eprintln!("master password set (generation {})", session.generation());
    session.close();
    store.close().await
}

/// `strongbox verify`
pub async fn run_verify(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    let password = read_secret(MASTER_PASSWORD_ENV_VAR, "Master password")?;
    let session = codec.unlock_session(&password).await?;
    eprintln!("master password ok (generation {})", session.generation());
    store.close().await
}

/// `strongbox change`
pub async fn run_change(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    let old = read_secret(MASTER_PASSWORD_ENV_VAR, "Current master password")?;
    let new = read_new_secret(NEW_MASTER_PASSWORD_ENV_VAR, "New master password")?;
    let rotation = codec.change_master_password(&old, &new).await?;

    let expires_at = codec
        .escrow_status()
        .await?
        .map(|status| status.expires_at.to_rfc3339())
        .unwrap_or_default();
    eprintln!(
        "master password changed (generation {} -> {})",
        rotation.previous_generation,
        rotation.session.generation()
    );
    eprintln!("recovery secret (shown once, valid until {expires_at}):");
    println!("{}", rotation.escrow_secret.expose_secret());
    eprintln!("run `strongbox rekey` with {RECOVERY_SECRET_ENV_VAR} set to finish the rotation");
    store.close().await
}

/// `strongbox recover`
pub async fn run_recover(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    let candidate = read_secret(RECOVERY_SECRET_ENV_VAR, "Recovery secret")?;
    let previous = codec.recover_from_escrow(&candidate).await?;
    if let Some(status) = codec.escrow_status().await? {
        eprintln!(
            "recovery secret ok (generation {}, {} of {} attempts used, expires {})",
            previous.generation(),
            status.attempt_count,
            MAX_ESCROW_ATTEMPTS,
            status.expires_at.to_rfc3339()
        );
    }
    store.close().await
}

/// `strongbox rekey`
pub async fn run_rekey(config: &StrongboxConfig, batch: usize) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    let password = read_secret(MASTER_PASSWORD_ENV_VAR, "Master password")?;
    let current = codec.unlock_session(&password).await?;

    if let MasterKeyState::Changing { .. } = codec.state().await? {
        let candidate = read_secret(RECOVERY_SECRET_ENV_VAR, "Recovery secret")?;
        let previous = codec.recover_from_escrow(&candidate).await?;
        let report = codec.rekey(&previous, &current, batch).await?;
        eprintln!(
            "re-encrypted {} item secrets ({} skipped, {} failed, {} remaining)",
            report.migrated, report.skipped, report.failed, report.remaining
        );
    } else {
        info!("no rotation in progress");
    }

    if codec.finish_rotation(&current).await? {
        eprintln!("rotation complete (generation {})", current.generation());
    } else {
        eprintln!("rotation not complete, escrow kept");
    }
    store.close().await
}

/// `strongbox public-key`
pub async fn run_public_key(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let (store, codec) = open(config).await?;
    print!("{}", codec.public_key_pem()?);
    store.close().await
}

/// `strongbox check`
pub async fn run_check(config: &StrongboxConfig) -> Result<(), StrongboxError> {
    let store = Arc::new(SqliteKeyStore::open(config.storage.clone()).await?);
    store.health_check().await?;
    let (_codec, report) =
        strongbox_vault::vault_startup_check(config, store.clone() as Arc<dyn KeyStore>).await?;

    println!("cipher:     ok");
    println!("storage:    ok ({})", config.storage.database_path);
    match report.master {
        MasterKeyState::Unset => println!("master:     not set"),
        MasterKeyState::Active { generation } => {
            println!("master:     active (generation {generation})")
        }
        MasterKeyState::Changing {
            generation,
            previous,
        } => println!("master:     changing (generation {previous} -> {generation})"),
    }
    match report.escrow {
        Some(status) => println!(
            "escrow:     {} of {} attempts used, expires {}",
            status.attempt_count,
            MAX_ESCROW_ATTEMPTS,
            status.expires_at.to_rfc3339()
        ),
        None => println!("escrow:     none"),
    }
    println!(
        "transport:  {} ({})",
        if report.transport_keys { "key pair present" } else { "no key pair yet" },
        config.transport.key_dir
    );
    store.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serial_test::serial;
    use strongbox_test_utils::TestEnv;

    fn set_env(key: &str, value: &str) {
        // SAFETY: test-only env mutation, serialized.
        unsafe { std::env::set_var(key, value) };
    }

    fn clear_env() {
        for key in [
            MASTER_PASSWORD_ENV_VAR,
            NEW_MASTER_PASSWORD_ENV_VAR,
            RECOVERY_SECRET_ENV_VAR,
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[tokio::test]
    #[serial]
    async fn init_then_verify() {
        let env = TestEnv::new().unwrap();
        set_env(MASTER_PASSWORD_ENV_VAR, "cli master");

        run_init(&env.config).await.unwrap();
        let second = run_init(&env.config).await;
        run_verify(&env.config).await.unwrap();

        set_env(MASTER_PASSWORD_ENV_VAR, "wrong");
        let wrong = run_verify(&env.config).await;
        clear_env();

        assert!(matches!(second, Err(StrongboxError::AlreadyInitialized)));
        assert!(matches!(wrong, Err(StrongboxError::InvalidCandidate)));
    }

    #[tokio::test]
    #[serial]
    async fn change_leaves_escrow_and_rekey_finishes_it() {
        let env = TestEnv::new().unwrap();
        set_env(MASTER_PASSWORD_ENV_VAR, "first");
        run_init(&env.config).await.unwrap();

        // Rotate through the codec so the test can see the recovery secret.
        let rotation = {
            let (store, codec) = open(&env.config).await.unwrap();
            let session = codec
                .unlock_session(&SecretString::from("first".to_string()))
                .await
                .unwrap();
            codec
                .store_item_secret("acct", "password", "pw", &session)
                .await
                .unwrap();
            let rotation = codec
                .change_master_password(
                    &SecretString::from("first".to_string()),
                    &SecretString::from("second".to_string()),
                )
                .await
                .unwrap();
            store.close().await.unwrap();
            rotation
        };

        set_env(MASTER_PASSWORD_ENV_VAR, "second");
        set_env(RECOVERY_SECRET_ENV_VAR, rotation.escrow_secret.expose_secret());
        let recover = run_recover(&env.config).await;
        let rekey = run_rekey(&env.config, 10).await;
        clear_env();
        recover.unwrap();
        rekey.unwrap();

        let (_store, codec) = open(&env.config).await.unwrap();
        assert_eq!(
            codec.state().await.unwrap(),
            MasterKeyState::Active { generation: 2 }
        );
        assert!(codec.escrow_status().await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn check_and_public_key_on_fresh_deployment() {
        let env = TestEnv::new().unwrap();
        run_check(&env.config).await.unwrap();
        run_public_key(&env.config).await.unwrap();
        assert!(
            std::path::Path::new(&env.config.transport.key_dir)
                .join("private.pem")
                .exists()
        );
    }
}
