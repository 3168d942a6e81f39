// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-time startup check run before serving any request.

use std::sync::Arc;

use strongbox_config::model::StrongboxConfig;
use strongbox_core::{EscrowStatus, KeyStore, MasterKeyState, StrongboxError};
use tracing::{info, warn};

use crate::codec::VaultCodec;

/// What the startup check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub master: MasterKeyState,
    pub escrow: Option<EscrowStatus>,
    /// Both RSA key files are present.
    pub transport_keys: bool,
}

/// Self-test the cipher, reach storage and inspect key material.
///
/// Returns a ready codec. Fails on `CipherUnavailable` or an unreachable
/// store; a missing master password or RSA key pair is only reported, since
/// `init` and the first `public-key` call create them.
pub async fn vault_startup_check(
    config: &StrongboxConfig,
    store: Arc<dyn KeyStore>,
) -> Result<(VaultCodec, StartupReport), StrongboxError> {
    let codec = VaultCodec::new(config, store)?;

    let master = codec.state().await?;
    let escrow = codec.escrow_status().await?;
    let transport_keys = codec.transport().has_key_pair();

    match master {
        MasterKeyState::Unset => info!("no master password set, run `strongbox init`"),
        MasterKeyState::Active { generation } => info!(generation, "master password active"),
        MasterKeyState::Changing {
            generation,
            previous,
        } => warn!(
            generation,
            previous, "master password rotation in progress, run `strongbox rekey`"
        ),
    }
    if !transport_keys {
        info!(
            key_dir = %config.transport.key_dir,
            "no RSA key pair yet, it is generated on first use"
        );
    }

    Ok((
        codec,
        StartupReport {
            master,
            escrow,
            transport_keys,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use strongbox_test_utils::{MemoryKeyStore, TestEnv};

    #[tokio::test]
    async fn fresh_deployment_reports_unset() {
        let env = TestEnv::new().unwrap();
        let (_codec, report) = vault_startup_check(&env.config, Arc::new(MemoryKeyStore::new()))
            .await
            .unwrap();
        assert_eq!(report.master, MasterKeyState::Unset);
        assert!(report.escrow.is_none());
        assert!(!report.transport_keys);
    }

    #[tokio::test]
    async fn reports_rotation_and_keys() {
        let env = TestEnv::new().unwrap();
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let codec = VaultCodec::new(&env.config, store.clone()).unwrap();
        codec
            .set_master_password(&SecretString::from("one".to_string()))
            .await
            .unwrap();
        codec
            .change_master_password(
                &SecretString::from("one".to_string()),
                &SecretString::from("two".to_string()),
            )
            .await
            .unwrap();
        codec.public_key_pem().unwrap();

        let (_codec, report) = vault_startup_check(&env.config, store).await.unwrap();
        assert_eq!(
            report.master,
            MasterKeyState::Changing {
                generation: 2,
                previous: 1
            }
        );
        assert_eq!(report.escrow.unwrap().attempt_count, 0);
        assert!(report.transport_keys);
    }
}
