use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by table building, reading and caching.
///
/// `Io` wraps the underlying error in an `Arc` so that a cursor can latch a
/// failure once and keep returning it from `status()`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("key not found")]
    NotFound,
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    pub fn corruption(msg: impl Into<String>) -> Error {
        Error::Corruption(msg.into())
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
