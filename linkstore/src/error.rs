//! Error taxonomy for the link engine.
//!
//! All failures here are local-recoverable: a failed fetch or merge leaves
//! the previous cache file and merged view intact. Nothing in this crate
//! aborts the process.

use thiserror::Error;

pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("invalid source URL: {0}")]
    InvalidSource(String),
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("provider error: {0}")]
    Provider(String),
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Serde(e.to_string())
    }
}
