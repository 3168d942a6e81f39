// SPDX-FileCopyrightText: 2026 Strongbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strongbox - key management for a self-hosted credential vault.
//!
//! Operator entry point: set, verify and rotate the master password, drive
//! the re-encryption pass, and inspect the deployment.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strongbox - key management for a self-hosted credential vault.
#[derive(Parser, Debug)]
#[command(name = "strongbox", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Set the first master password.
    Init,
    /// Check a master password without changing anything.
    Verify,
    /// Change the master password and escrow the previous key.
    Change,
    /// Check a recovery secret against the current escrow.
    Recover,
    /// Re-encrypt items left under the previous master password.
    Rekey {
        /// Rows per batch.
        #[arg(long, default_value_t = 100)]
        batch: usize,
    },
    /// Print the RSA public key clients encrypt with.
    PublicKey,
    /// Self-test the cipher and report the key-management state.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => strongbox_config::load_and_validate_path(path),
        None => strongbox_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            strongbox_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.log_level);

    let Some(command) = cli.command else {
        println!("strongbox: use --help for available commands");
        return;
    };

    let result = match command {
        Commands::Init => commands::run_init(&config).await,
        Commands::Verify => commands::run_verify(&config).await,
        Commands::Change => commands::run_change(&config).await,
        Commands::Recover => commands::run_recover(&config).await,
        Commands::Rekey { batch } => commands::run_rekey(&config, batch).await,
        Commands::PublicKey => commands::run_public_key(&config).await,
        Commands::Check => commands::run_check(&config).await,
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "command failed");
        eprintln!("error: {}", e.user_message());
        std::process::exit(1);
    }
}

/// Log to stderr so secrets printed on stdout can be piped cleanly.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("strongbox={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
