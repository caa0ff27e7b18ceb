use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;

use sealpost::envelope::Envelope;
use sealpost::transport::TransportConfig;
use sealpost::{logging, permissions, settings};

/// Sends the email described by a config file, PGP encrypted when the
/// recipients' keys are in the gpg keyring.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file to use
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Never encrypt, even when the recipients have PGP keys
    #[arg(long)]
    plain: bool,

    /// Print the payload instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Leave the executable's permissions alone
    #[arg(long)]
    skip_permission_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_logger(args.log_level)?;

    if !args.skip_permission_check {
        if let Err(err) = permissions::harden_executable() {
            warn!("Error while checking permissions. {}", err);
        }
    }

    let mut config = settings::load_settings(&args.config)?;
    if args.dry_run {
        config.transport = TransportConfig::Console;
    }

    let envelope = Envelope::from_config(&config)
        .initialize()
        .await
        .with_context(|| format!("Error while initializing transport. Config file: '{}'", args.config.display()))?;

    if !args.plain && envelope.is_pgp_candidate().await {
        info!("Recipient keys found, sending PGP email");
        envelope
            .send_encrypted()
            .await
            .with_context(|| format!("Error while sending PGP email. Config file: '{}'", args.config.display()))?;
    } else {
        info!("Sending plain text email");
        envelope
            .send_plain()
            .await
            .with_context(|| format!("Error while sending plain text email. Config file: '{}'", args.config.display()))?;
    }

    Ok(())
}
