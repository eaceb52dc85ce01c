//! Error types for zvp8

use thiserror::Error;

/// Result type alias for zvp8 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for zvp8
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container format error
    #[error("Format error: {0}")]
    Format(String),

    /// Malformed VP8 bitstream
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    /// Bitstream feature the decoder declines to handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Allocation failure
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// End of stream
    #[error("End of stream")]
    EndOfStream,
}

impl Error {
    /// Create a format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }

    /// Create an invalid-stream error
    pub fn invalid_stream<S: Into<String>>(msg: S) -> Self {
        Error::InvalidStream(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a resource-exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Error::ResourceExhausted(msg.into())
    }
}
