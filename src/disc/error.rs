//! Error type shared by every storage representation

use thiserror::Error;

/// Result alias used throughout the disc module
pub type DiscResult<T> = Result<T, DiscError>;

/// Errors that can occur while reading or modifying a disc representation
#[derive(Debug, Error)]
pub enum DiscError {
    /// Magic not found, bad container tags, or a corrupt directory record
    #[error("Format error: {0}")]
    Format(String),

    /// Seek or remap outside of the addressable range
    #[error("Address out of range: {0}")]
    AddressOutOfRange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An on-disk layout this crate does not implement
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl DiscError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn out_of_range(msg: impl Into<String>) -> Self {
        Self::AddressOutOfRange(msg.into())
    }
}

impl From<DiscError> for std::io::Error {
    fn from(err: DiscError) -> Self {
        match err {
            DiscError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
