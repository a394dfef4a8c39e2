//! Error types for the command log core.
//!
//! Per-session failures (transport, seek, oversized writes) are values of
//! [`LogError`] and never escape the session that triggered them. Startup
//! failures use `anyhow` at the binary boundary instead.

use std::io;
use thiserror::Error;

/// Errors produced by log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Reading from or writing to a session endpoint failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A seek named a command index or intra-command offset outside the
    /// current logical range. State is never mutated by a rejected seek.
    #[error("invalid seek: command {index}, offset {offset}")]
    InvalidSeek { index: usize, offset: usize },

    /// An in-flight line grew past the configured cap. The line is abandoned;
    /// the ring is untouched.
    #[error("write exceeds the {limit}-byte line limit")]
    OversizedWrite { limit: usize },

    /// The backing file could not be rewritten.
    #[error("backing store error: {0}")]
    Backing(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;
