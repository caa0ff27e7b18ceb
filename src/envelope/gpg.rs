use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{EnvelopeError, Result};

/// Which half of the keyring to look into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Secret,
}

/// OpenPGP operations the PGP pipeline relies on.
#[async_trait]
pub trait OpenPgp: Debug + Send + Sync {
    /// True if the keyring holds a key of `kind` for ANY of `key_ids`.
    /// Never fails: an unusable keyring counts as "absent".
    async fn has_key(&self, kind: KeyKind, key_ids: &[String]) -> bool;

    /// ASCII-armored detached signature of `data` made with `key_id`.
    async fn sign(&self, data: &[u8], key_id: &str, passphrase_file: Option<&Path>) -> Result<Vec<u8>>;

    /// ASCII-armored encryption of `data` for `recipients`, plus `sender` when given.
    async fn encrypt(&self, data: &[u8], sender: Option<&str>, recipients: &[String]) -> Result<Vec<u8>>;
}

fn default_program() -> PathBuf {
    PathBuf::from("gpg")
}

fn default_timeout_secs() -> u64 {
    60
}

/// How the gpg executable is invoked.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GpgSettings {
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub homedir: Option<PathBuf>,
    /// Prepended to every invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GpgSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            homedir: None,
            extra_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// [`OpenPgp`] backed by the `gpg` command line tool.
#[derive(Debug, Clone, Default)]
pub struct Gpg {
    settings: GpgSettings,
}

impl Gpg {
    pub fn new(settings: GpgSettings) -> Self {
        Self { settings }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.extra_args);
        if let Some(homedir) = &self.settings.homedir {
            cmd.arg("--homedir").arg(homedir);
        }
        cmd.args(args).kill_on_drop(true);
        cmd
    }

    /// Runs gpg with `input` on stdin.
    ///
    /// stdin is fed from its own task and closed once everything is written,
    /// while stdout and stderr are drained together until exit. Past the
    /// timeout the child is killed.
    async fn run(&self, operation: &'static str, args: Vec<String>, input: &[u8]) -> Result<Vec<u8>> {
        debug!("{} data. Executing {} {:?}", operation, self.settings.program.display(), args);

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("gpg stdin was not captured"))?;
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                writer.abort();
                return Err(EnvelopeError::GpgTimeout {
                    operation,
                    seconds: self.settings.timeout_secs,
                });
            }
        };

        // A failing gpg usually closes stdin early: its stderr is the useful error.
        if !output.status.success() {
            return Err(EnvelopeError::Gpg {
                operation,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(err) => return Err(std::io::Error::other(err).into()),
        }

        Ok(output.stdout)
    }
}

fn batch_args() -> Vec<String> {
    ["--batch", "--pinentry-mode", "loopback"]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

pub(crate) fn probe_args(kind: KeyKind, key_ids: &[String]) -> Vec<String> {
    let list = match kind {
        KeyKind::Public => "--list-public-keys",
        KeyKind::Secret => "--list-secret-keys",
    };
    let mut args = vec![list.to_string(), "--batch".to_string(), "--with-colons".to_string()];
    args.extend(key_ids.iter().cloned());
    args
}

pub(crate) fn sign_args(key_id: &str, passphrase_file: Option<&Path>) -> Vec<String> {
    let mut args = batch_args();
    args.extend(
        ["--armor", "--trust-model", "always", "--detach-sig", "--local-user", key_id]
            .iter()
            .map(|arg| arg.to_string()),
    );
    if let Some(passphrase_file) = passphrase_file {
        args.push("--passphrase-file".to_string());
        args.push(passphrase_file.display().to_string());
    }
    args
}

pub(crate) fn encrypt_args(sender: Option<&str>, recipients: &[String]) -> Vec<String> {
    let mut args = batch_args();
    args.extend(
        ["--encrypt", "--armor", "--trust-model", "always"]
            .iter()
            .map(|arg| arg.to_string()),
    );
    for key_id in sender.into_iter().chain(recipients.iter().map(String::as_str)) {
        args.push("--recipient".to_string());
        args.push(key_id.to_string());
    }
    args
}

#[async_trait]
impl OpenPgp for Gpg {
    async fn has_key(&self, kind: KeyKind, key_ids: &[String]) -> bool {
        // gpg lists the whole keyring when given no ids
        if key_ids.is_empty() {
            return false;
        }

        let mut cmd = self.command(&probe_args(kind, key_ids));
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        match tokio::time::timeout(self.timeout(), cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                warn!("Could not run {}: {}", self.settings.program.display(), err);
                false
            }
            Err(_) => {
                warn!("Key lookup timed out after {}s", self.settings.timeout_secs);
                false
            }
        }
    }

    async fn sign(&self, data: &[u8], key_id: &str, passphrase_file: Option<&Path>) -> Result<Vec<u8>> {
        self.run("signing", sign_args(key_id, passphrase_file), data).await
    }

    async fn encrypt(&self, data: &[u8], sender: Option<&str>, recipients: &[String]) -> Result<Vec<u8>> {
        self.run("encrypting", encrypt_args(sender, recipients), data).await
    }
}
