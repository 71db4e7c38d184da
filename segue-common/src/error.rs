//! Error types shared across Segue crates
//!
//! Service crates define their own richer error enums and convert these
//! via `#[from]`.

use thiserror::Error;

/// Error type for the shared library
#[derive(Error, Debug)]
pub enum Error {
    /// Queue document (de)serialization errors
    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the shared Error
pub type Result<T> = std::result::Result<T, Error>;
