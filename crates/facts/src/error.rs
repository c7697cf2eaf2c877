//! Facts Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A facts error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for facts operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The link could not be resolved to an absolute URL.
    #[display("invalid link: {_0}")]
    InvalidLink(#[error(not(source))] String),
    /// The fetcher knows nothing about this repository.
    #[display("no facts for repository: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Network-related failure while talking to the provider.
    #[display("network error")]
    Network,
    /// The fetch didn't finish in time.
    #[display("fetch timed out")]
    Timeout,
    /// The provider (or fixture) returned something that isn't a facts mapping.
    #[display("invalid facts data")]
    InvalidData,
    /// The fixture file could not be read.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Io)
    }
}
