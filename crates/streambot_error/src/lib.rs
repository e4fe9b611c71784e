//! Error types for the streambot crates.
//!
//! Every error records the source location where it was created, so a
//! permission failure surfaced in a chat reply or a log line can be traced
//! back to the call that produced it.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod flag;

pub use config::{ConfigError, ConfigErrorKind};
pub use flag::{FlagError, FlagErrorKind, FlagResult};

/// Crate-level error variants.
#[derive(Debug, derive_more::From, derive_more::Display)]
pub enum StreambotErrorKind {
    /// Feature flag error
    #[display("{}", _0)]
    Flag(FlagError),
    /// Configuration error
    #[display("{}", _0)]
    Config(ConfigError),
}

/// Streambot error with kind discrimination.
#[derive(Debug, derive_more::Display)]
#[display("Streambot Error: {}", _0)]
pub struct StreambotError(Box<StreambotErrorKind>);

impl StreambotError {
    /// Create a new error from a kind.
    pub fn new(kind: StreambotErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &StreambotErrorKind {
        &self.0
    }
}

impl std::error::Error for StreambotError {}

// Generic From implementation for any type that converts to StreambotErrorKind
impl<T> From<T> for StreambotError
where
    T: Into<StreambotErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for streambot operations.
pub type StreambotResult<T> = std::result::Result<T, StreambotError>;
