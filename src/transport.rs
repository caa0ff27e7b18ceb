pub mod gmail;
pub mod smtp;

use log::info;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::error::{EnvelopeError, Result};
use crate::transport::gmail::{GmailConfig, GmailTransport};
use crate::transport::smtp::{SmtpConfig, SmtpTransport};

/// Which transport delivers the payload, with its own settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    GmailOAuth2(GmailConfig),
    /// Print the payload on stdout instead of sending it.
    Console,
}

impl TransportConfig {
    /// Reads credentials, builds clients: everything a transport needs before
    /// its first send.
    pub async fn initialize(&self) -> Result<Transport> {
        match self {
            TransportConfig::Smtp(config) => Ok(Transport::Smtp(SmtpTransport::new(config.clone())?)),
            TransportConfig::GmailOAuth2(config) => Ok(Transport::GmailOAuth2(GmailTransport::new(config).await?)),
            TransportConfig::Console => Ok(Transport::Console),
        }
    }
}

/// An initialized transport.
#[derive(Debug, Clone)]
pub enum Transport {
    Smtp(SmtpTransport),
    GmailOAuth2(GmailTransport),
    Console,
    Memory(MemoryTransport),
}

impl Transport {
    /// Delivers `payload` on behalf of `sender`.
    pub async fn send(&self, payload: &[u8], sender: &str) -> Result<()> {
        match self {
            Transport::Smtp(smtp) => smtp.send(payload, sender).await,
            Transport::GmailOAuth2(gmail) => gmail.send(payload, sender).await,
            Transport::Console => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(payload).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                Ok(())
            }
            Transport::Memory(memory) => memory.send(payload, sender),
        }?;
        info!("Email from {} handed over to the {} transport", sender, self.name());
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transport::Smtp(_) => "smtp",
            Transport::GmailOAuth2(_) => "gmailOAuth2",
            Transport::Console => "console",
            Transport::Memory(_) => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub payload: Vec<u8>,
    pub sender: String,
}

/// Keeps every sent message in memory. Clones share the same mailbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, payload: &[u8], sender: &str) -> Result<()> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| EnvelopeError::Transport(e.to_string()))?;
        sent.push(SentMessage {
            payload: payload.to_vec(),
            sender: sender.to_string(),
        });
        Ok(())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}
