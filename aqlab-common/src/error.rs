//! Shared error taxonomy (spec.md §7)

use thiserror::Error;

/// Common result type for aqlab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the Store, Scanner, Queue, Probe, Analysis
/// pipeline, and Metadata writer.
#[derive(Error, Debug)]
pub enum Error {
    /// Entity lookup found nothing; distinguishable from other failures so
    /// callers can branch on it directly.
    #[error("not found: {0}")]
    NotFound(String),

    /// Already-running scan, duplicate path, or lost a concurrent claim.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retryable filesystem/network condition (pattern-matched stderr, or
    /// a stat failure on a network share). Handled internally with bounded
    /// backoff; only escapes when retries are exhausted.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// External decoder/prober exited non-zero after retries were
    /// exhausted. Recorded against the analysis module, never fails the
    /// parent job.
    #[error("decoder failure: {0}")]
    DecoderFailure(String),

    /// Malformed probe or decoder output.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[cfg(feature = "sqlx")]
    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Bad operator input; surfaced to the caller, never logged as a
    /// system error.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
