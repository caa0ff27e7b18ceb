use lettre::address::Envelope as SmtpEnvelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{EnvelopeError, Result};

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// STARTTLS SMTP relay, authenticated when credentials are configured.
#[derive(Clone)]
pub struct SmtpTransport {
    config: SmtpConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn transport_error(err: impl fmt::Display) -> EnvelopeError {
    EnvelopeError::Transport(err.to_string())
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| EnvelopeError::Config(format!("Invalid SMTP relay '{}': {}", config.host, e)))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            config,
        })
    }

    pub async fn send(&self, payload: &[u8], sender: &str) -> Result<()> {
        let envelope = smtp_envelope(payload, sender)?;
        debug!("Sending to {:?} via {}:{}", envelope.to(), self.config.host, self.config.port);

        match self.mailer.send_raw(&envelope, payload).await {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("authentication mechanism") => {
                warn!("{} does not support AUTH, retrying without it", self.config.host);
                self.send_without_auth(&envelope, payload).await
            }
            Err(err) => Err(transport_error(err)),
        }
    }

    async fn send_without_auth(&self, envelope: &SmtpEnvelope, payload: &[u8]) -> Result<()> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
            .port(self.config.port)
            .build();
        mailer
            .send_raw(envelope, payload)
            .await
            .map(|_| ())
            .map_err(|e| EnvelopeError::Transport(format!("Couldn't send to {}: {}", self.config.host, e)))
    }
}

static RECIPIENT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^(?:to|cc):(.*?)\r?$").expect("valid recipient header regex"));

/// `To:` and `Cc:` addresses from the header block of `payload`.
pub fn extract_recipients(payload: &[u8]) -> Result<Vec<String>> {
    let text = String::from_utf8_lossy(payload);
    let headers = text.split("\r\n\r\n").next().unwrap_or_default();

    let recipients = RECIPIENT_HEADER
        .captures_iter(headers)
        .flat_map(|caps| {
            caps[1]
                .split(',')
                .map(|address| address.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|address| !address.is_empty())
        .collect();

    Ok(recipients)
}

fn smtp_envelope(payload: &[u8], sender: &str) -> Result<SmtpEnvelope> {
    let parse = |address: &str| {
        address
            .parse::<Address>()
            .map_err(|e| EnvelopeError::Transport(format!("Invalid address '{}': {}", address, e)))
    };

    let from = parse(sender)?;
    let to = extract_recipients(payload)?
        .iter()
        .map(|address| parse(address))
        .collect::<Result<Vec<_>>>()?;

    SmtpEnvelope::new(Some(from), to).map_err(transport_error)
}
