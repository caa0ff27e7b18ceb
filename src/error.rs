use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error reading attachment '{}': {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while {operation} PGP message ({status}), gpg stderr: \"{stderr}\"")]
    Gpg {
        operation: &'static str,
        status: String,
        stderr: String,
    },

    #[error("gpg timed out after {seconds}s while {operation} PGP message")]
    GpgTimeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("Neither the recipient nor any cc entry has a PGP key id")]
    NoRecipientKey,

    #[error("Strategy needs to be initialized")]
    StrategyNotInitialized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
