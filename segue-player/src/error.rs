//! Error types for segue-player
//!
//! Module-specific error enum using thiserror. Store and transport
//! failures stay typed all the way up; the session decides recovery.

use thiserror::Error;

/// Main error type for the segue-player service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared-type errors (queue document codec)
    #[error(transparent)]
    Common(#[from] segue_common::Error),

    /// Transport acquisition or control errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Requesting actor is not in a joinable channel
    #[error("Requester is not in a joinable channel")]
    NotInChannel,

    /// Media stream startup or delivery errors
    #[error("Stream error: {0}")]
    Stream(String),

    /// Session actor is gone or refused the command
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same operation can plausibly succeed.
    ///
    /// Only backend database errors qualify; a corrupt document or a
    /// precondition failure will not get better on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

/// Convenience Result type using segue-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Database(sqlx::Error::PoolClosed).is_transient());
        assert!(!Error::NotInChannel.is_transient());
        assert!(!Error::Stream("dead".to_string()).is_transient());
    }
}
