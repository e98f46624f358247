//! Error types for signing, key handling and envelope I/O.
//!
//! Decision-path failures are not errors: the enforcement engine reports them
//! as [`Reason`](crate::enforcement::Reason) values. `SigError` covers the
//! operations that genuinely cannot proceed.

use std::path::PathBuf;

/// Errors from key loading, signing, envelope decoding and scanning.
#[derive(Debug, thiserror::Error)]
pub enum SigError {
    /// Filesystem access failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key material could not be decoded or encoded.
    #[error("invalid key: {message}")]
    Key { message: String },

    /// Payload or header could not be canonicalized.
    #[error("canonicalization failed: {message}")]
    Canonicalize { message: String },

    /// Envelope document could not be decoded.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope { message: String },

    /// Policy document could not be parsed.
    #[error("invalid policy document {}: {message}", path.display())]
    Policy { path: PathBuf, message: String },

    /// Configuration or argument error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl SigError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } | Self::Config { .. } | Self::Policy { .. } => 1,
            Self::Key { .. } | Self::Canonicalize { .. } => 1,
            Self::MalformedEnvelope { .. } => 4,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for fallible signing operations.
pub type SigResult<T> = Result<T, SigError>;
