use anyhow::{Context, Result};
use backtrace::Backtrace;
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::envelope::gpg::GpgSettings;
use crate::transport::TransportConfig;

/// An email address and the OpenPGP key id used to find its keys.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Entity {
    pub email: String,
    // the key id may be the email itself, e.g. "0x7ADE4B572836C909" or "sysadmin@example.com"
    #[serde(rename = "pgpKeyId", alias = "keyId", default)]
    pub pgp_key_id: String,
}

impl Entity {
    /// Entity whose key id is its email address.
    pub fn new(email: &str) -> Self {
        Self::with_key(email, email)
    }

    pub fn with_key(email: &str, pgp_key_id: &str) -> Self {
        Self {
            email: email.to_string(),
            pgp_key_id: pgp_key_id.to_string(),
        }
    }
}

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub sender: Entity,
    #[serde(default)]
    pub fake_sender: Option<String>,
    pub recipient: Entity,
    #[serde(default)]
    pub cc: Vec<Entity>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text_message: String,
    #[serde(default, rename = "htmlMessage")]
    pub html_message: String,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
    /// Passphrase of the sender's secret key, needed to sign.
    #[serde(default)]
    pub sender_pass_file: Option<PathBuf>,
    pub transport: TransportConfig,
    #[serde(default)]
    pub gpg: GpgSettings,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Loads the configuration from a JSON file, or YAML for `.yaml`/`.yml`.
pub fn load_settings(path: &Path) -> Result<Config> {
    let file = File::open(path);
    let file = match file {
        Ok(file) => file,
        Err(err) => {
            error!("Error: {}", err);

            // Capture and print the backtrace
            let backtrace = Backtrace::new();
            error!("Backtrace:\n{:?}", backtrace);
            return Err(err).with_context(|| format!("Cannot open config file '{}'", path.display()));
        }
    };

    let reader = BufReader::new(file);

    let config: Result<Config> = if is_yaml(path) {
        serde_yaml::from_reader(reader).map_err(Into::into)
    } else {
        serde_json::from_reader(reader).map_err(Into::into)
    };
    match config {
        Ok(config) => Ok(config),
        Err(err) => {
            error!("Error: {}", err);

            let backtrace = Backtrace::new();
            error!("Backtrace:\n{:?}", backtrace);
            Err(err).with_context(|| format!("Cannot deserialize config file '{}'", path.display()))
        }
    }
}
