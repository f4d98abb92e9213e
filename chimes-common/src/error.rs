//! Common error types for Ledger Chimes
//!
//! Defines the shared error taxonomy using thiserror for clear error
//! propagation across the stream client and sonification engine.

use thiserror::Error;

/// Common result type for Ledger Chimes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across Ledger Chimes crates
#[derive(Error, Debug)]
pub enum Error {
    /// Connection or protocol failure on the ledger transport.
    /// Retried per reconnection backoff; surfaced as fatal only after the
    /// attempt budget is exhausted.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Primary subscribe request rejected by the remote node
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Inbound payload missing required fields or malformed
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] crate::record::MalformedRecord),

    /// No usable audio output backend
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Audio device or stream failure
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}
