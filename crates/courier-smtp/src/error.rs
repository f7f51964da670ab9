//! Error types for SMTP sessions.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server answered with a 4xx or 5xx reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply text, lines joined with newlines.
        message: String,
    },

    /// The server said something that is not a valid SMTP reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Envelope address that cannot be put on the wire.
    #[error("Invalid envelope address: {0}")]
    InvalidAddress(String),

    /// Feature not offered by the server or the stream.
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the session can still be used after this error.
    ///
    /// Only a well-formed reply from the server leaves the session in a known
    /// state. Stream, TLS and framing errors do not.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::SmtpError { .. })
    }
}
