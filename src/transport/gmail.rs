use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Datelike, Duration, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{EnvelopeError, Result};

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GmailConfig {
    /// OAuth2 client file downloaded from the Google console.
    pub config_file: PathBuf,
    /// Previously obtained token, holding at least the refresh token.
    pub token_file: PathBuf,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize, Clone)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    #[serde(alias = "web")]
    installed: ClientSecret,
}

#[derive(Deserialize)]
pub(crate) struct Token {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub(crate) fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        // year 1 is the "never expires" zero value written by some tools
        match self.expiry {
            Some(expiry) if expiry.year() > 1 => expiry - Duration::seconds(10) <= Utc::now(),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Sends raw messages through the Gmail API with an OAuth2 user token.
#[derive(Clone)]
pub struct GmailTransport {
    client: reqwest::Client,
    secret: ClientSecret,
    token: Arc<Mutex<Token>>,
}

impl fmt::Debug for GmailTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailTransport")
            .field("client_id", &self.secret.client_id)
            .finish_non_exhaustive()
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| EnvelopeError::Config(format!("Error reading Gmail OAuth2 {} '{}': {}", what, path.display(), e)))?;
    serde_json::from_slice(&contents)
        .map_err(|e| EnvelopeError::Config(format!("Error parsing Gmail OAuth2 {} '{}': {}", what, path.display(), e)))
}

impl GmailTransport {
    pub async fn new(config: &GmailConfig) -> Result<Self> {
        let secret: ClientSecretFile = read_json(&config.config_file, "config").await?;
        let token: Token = read_json(&config.token_file, "token").await?;

        Ok(Self {
            client: reqwest::Client::new(),
            secret: secret.installed,
            token: Arc::new(Mutex::new(token)),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.is_expired() {
            return Ok(token.access_token.clone());
        }

        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| EnvelopeError::Transport("Gmail OAuth2 token expired and has no refresh token".to_string()))?;
        debug!("Refreshing Gmail OAuth2 access token");

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token.as_str());
        params.insert("client_id", self.secret.client_id.as_str());
        params.insert("client_secret", self.secret.client_secret.as_str());

        let response = self
            .client
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| EnvelopeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(EnvelopeError::Transport(format!(
                "Token refresh failed ({}): {}",
                status, error_body
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| EnvelopeError::Transport(format!("Failed to parse token response: {}", e)))?;

        token.access_token = refreshed.access_token;
        if let Some(refresh_token) = refreshed.refresh_token {
            token.refresh_token = Some(refresh_token);
        }
        token.expiry = refreshed
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        Ok(token.access_token.clone())
    }

    pub async fn send(&self, payload: &[u8], sender: &str) -> Result<()> {
        let access_token = self.access_token().await?;
        let url = format!("{}/users/{}/messages/send", GMAIL_API, sender);
        let body = serde_json::json!({ "raw": URL_SAFE.encode(payload) });

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnvelopeError::Transport(format!("Couldn't send email: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(EnvelopeError::Transport(format!(
                "Couldn't send email ({}): {}",
                status, error_body
            )));
        }

        info!("Gmail accepted the message from {}", sender);
        Ok(())
    }
}
