//! sealpost: builds outbound email payloads, plain MIME or PGP/MIME signed and
//! encrypted through gpg, and hands them to a transport.
//!
//! - [`envelope`]: the message, its MIME rendering and the PGP pipeline
//! - [`transport`]: SMTP, Gmail OAuth2, console and in-memory delivery
//! - [`settings`]: configuration file
//! - [`error`]: error type

pub mod envelope;
pub mod error;
pub mod logging;
pub mod permissions;
pub mod settings;
pub mod transport;


pub use envelope::Envelope;
pub use error::{EnvelopeError, Result};
pub use settings::{Config, Entity};
