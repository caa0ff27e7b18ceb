pub mod attachments;
pub mod encoding;
pub mod gpg;
pub mod mime;
pub mod pgp;
pub mod sniff;
pub mod template;

use log::{debug, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::envelope::gpg::{Gpg, OpenPgp};
use crate::envelope::mime::{BoundarySource, RandomBoundary};
use crate::error::{EnvelopeError, Result};
use crate::settings::{Config, Entity};
use crate::transport::{Transport, TransportConfig};

/// Something skipped while resolving placeholders or attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    Hostname,
    TimeFormat(String),
    Placeholder { path: PathBuf, reason: String },
    Attachment { path: PathBuf, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Hostname => write!(f, "Hostname could not be determined, %h left as is"),
            Warning::TimeFormat(format) => {
                write!(f, "Invalid time format '{}', placeholder left as is", format)
            }
            Warning::Placeholder { path, reason } => write!(
                f,
                "Error with placeholder file '{}'. Replacing it with nothing. {}",
                path.display(),
                reason
            ),
            Warning::Attachment { path, reason } => write!(
                f,
                "Error with attachment '{}'. Ignoring it. {}",
                path.display(),
                reason
            ),
        }
    }
}

/// A value together with the soft failures met while producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Resolved<T> {
    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Reports every warning on the log and keeps the value.
    pub fn log_warnings(self) -> T {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        self.value
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Pending(TransportConfig),
    Ready(Transport),
}

/// One outbound message before rendering.
///
/// Every setter replaces its field and hands the envelope back. Text fields are
/// stored after placeholder substitution and attachments after expansion, so
/// both happen once, when set.
#[derive(Debug, Clone)]
pub struct Envelope {
    sender: Entity,
    fake_sender: Option<String>,
    recipient: Entity,
    cc: Vec<Entity>,
    subject: String,
    text_body: String,
    html_body: String,
    attachments: Vec<PathBuf>,
    passphrase_file: Option<PathBuf>,
    strategy: Strategy,
    openpgp: Arc<dyn OpenPgp>,
}

/// Contents of `value` read as a file when it looks like a path ending in
/// `extension` and the file is readable; `value` itself otherwise.
fn source_file(value: &str, extension: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() > extension.len() && trimmed.ends_with(extension) {
        match fs::read_to_string(trimmed) {
            Ok(contents) => return contents,
            Err(err) => debug!("'{}' is not a readable file, using it as text: {}", trimmed, err),
        }
    }
    value.to_string()
}

impl Envelope {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            sender: Entity::default(),
            fake_sender: None,
            recipient: Entity::default(),
            cc: Vec::new(),
            subject: String::new(),
            text_body: String::new(),
            html_body: String::new(),
            attachments: Vec::new(),
            passphrase_file: None,
            strategy: Strategy::Pending(transport),
            openpgp: Arc::new(Gpg::default()),
        }
    }

    /// Runs every setter on the configured values.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.transport.clone())
            .with_openpgp(Arc::new(Gpg::new(config.gpg.clone())))
            .with_subject(&config.subject)
            .with_cc(config.cc.clone())
            .with_sender(config.sender.clone())
            .with_fake_sender(config.fake_sender.as_deref().unwrap_or_default())
            .with_attachments(&config.attachments)
            .with_recipient(config.recipient.clone())
            .with_html_body(&config.html_message)
            .with_text_body(&config.text_message)
            .with_passphrase_file(config.sender_pass_file.clone())
    }

    /// Initializes the pending transport. Sending requires it.
    pub async fn initialize(mut self) -> Result<Self> {
        if let Strategy::Pending(config) = &self.strategy {
            let transport = config.initialize().await?;
            debug!("{} transport initialized", transport.name());
            self.strategy = Strategy::Ready(transport);
        }
        Ok(self)
    }

    /// Uses an already initialized transport.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.strategy = Strategy::Ready(transport);
        self
    }

    pub fn with_openpgp(mut self, openpgp: Arc<dyn OpenPgp>) -> Self {
        self.openpgp = openpgp;
        self
    }

    pub fn with_sender(mut self, sender: Entity) -> Self {
        self.sender = sender;
        self
    }

    /// Address shown in `From:`; an empty one means the sender's own.
    pub fn with_fake_sender(mut self, fake_sender: &str) -> Self {
        self.fake_sender = Some(fake_sender.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn with_recipient(mut self, recipient: Entity) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_cc(mut self, cc: Vec<Entity>) -> Self {
        self.cc = cc;
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = template::resolve_with_warnings(subject).log_warnings();
        self
    }

    /// `text` may name a `.txt` file holding the body.
    pub fn with_text_body(mut self, text: &str) -> Self {
        let text = source_file(text, ".txt");
        self.text_body = template::resolve_with_warnings(&text).log_warnings();
        self
    }

    /// `html` may name a `.html` file holding the body.
    pub fn with_html_body(mut self, html: &str) -> Self {
        let html = source_file(html, ".html");
        self.html_body = template::resolve_with_warnings(&html).log_warnings();
        self
    }

    /// Stores the expanded file list; directories are walked right away.
    pub fn with_attachments<P: AsRef<Path>>(mut self, paths: &[P]) -> Self {
        self.attachments = attachments::resolve(paths).log_warnings();
        self
    }

    pub fn with_passphrase_file(mut self, passphrase_file: Option<PathBuf>) -> Self {
        self.passphrase_file = passphrase_file;
        self
    }

    pub fn sender(&self) -> &Entity {
        &self.sender
    }

    /// The fake sender if set, the sender's email otherwise.
    pub fn effective_sender(&self) -> &str {
        self.fake_sender.as_deref().unwrap_or(&self.sender.email)
    }

    pub fn recipient(&self) -> &Entity {
        &self.recipient
    }

    pub fn cc(&self) -> &[Entity] {
        &self.cc
    }

    /// Non-empty cc emails, in order.
    pub fn cc_emails(&self) -> Vec<String> {
        self.cc
            .iter()
            .filter(|entity| !entity.email.is_empty())
            .map(|entity| entity.email.clone())
            .collect()
    }

    /// Key ids of the cc entries that have both an email and a key id, in
    /// order. An entry without an email is not a recipient, so its key is
    /// neither probed nor encrypted for.
    pub fn cc_key_ids(&self) -> Vec<String> {
        self.cc
            .iter()
            .filter(|entity| !entity.email.is_empty() && !entity.pgp_key_id.is_empty())
            .map(|entity| entity.pgp_key_id.clone())
            .collect()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    pub fn passphrase_file(&self) -> Option<&Path> {
        self.passphrase_file.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.strategy, Strategy::Ready(_))
    }

    pub fn openpgp(&self) -> &dyn OpenPgp {
        self.openpgp.as_ref()
    }

    /// The `multipart/alternative` text/html sub-message on its own.
    pub fn alternative_part(&self, boundaries: &mut dyn BoundarySource) -> Vec<u8> {
        mime::build_alternative(self, boundaries)
    }

    pub fn plain_payload_with(&self, boundaries: &mut dyn BoundarySource) -> Result<Vec<u8>> {
        mime::build_plain(self, boundaries)
    }

    pub fn plain_payload(&self) -> Result<Vec<u8>> {
        self.plain_payload_with(&mut RandomBoundary)
    }

    pub async fn pgp_payload_with(&self, boundaries: &mut dyn BoundarySource) -> Result<Vec<u8>> {
        pgp::build_encrypted(self, boundaries).await
    }

    pub async fn pgp_payload(&self) -> Result<Vec<u8>> {
        self.pgp_payload_with(&mut RandomBoundary).await
    }

    /// True if at least one recipient (the recipient or a cc) has a public key
    /// in the keyring.
    pub async fn is_pgp_candidate(&self) -> bool {
        pgp::is_candidate(self).await
    }

    fn transport(&self) -> Result<&Transport> {
        match &self.strategy {
            Strategy::Ready(transport) => Ok(transport),
            Strategy::Pending(_) => Err(EnvelopeError::StrategyNotInitialized),
        }
    }

    pub async fn send_plain(&self) -> Result<()> {
        let transport = self.transport()?;

        debug!("Creating email payload");
        let payload = self.plain_payload()?;
        debug!("Done creating email payload");

        transport.send(&payload, self.effective_sender()).await
    }

    /// Sends the PGP/MIME version; see [`pgp::build_encrypted`].
    pub async fn send_encrypted(&self) -> Result<()> {
        let transport = self.transport()?;

        debug!("Creating PGP email payload");
        let payload = self.pgp_payload().await?;
        debug!("Done creating PGP email payload");

        transport.send(&payload, self.effective_sender()).await
    }
}
