//! Error types for MIME operations.

use std::io;
use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Writing the serialized message to its sink failed.
    #[error("Failed to render message: {0}")]
    Render(#[source] io::Error),

    /// Structural problem while reading a message.
    ///
    /// `part` is the zero-based index of the leaf part being read when the
    /// problem was found.
    #[error("Parse error in part {part}: {message}")]
    Parse {
        /// Index of the offending leaf part.
        part: usize,
        /// Description of the problem.
        message: String,
    },

    /// Text declared in a charset this library cannot convert.
    #[error("Unsupported charset: {charset}")]
    Decode {
        /// The charset label as it appeared in the message.
        charset: String,
    },

    /// Invalid MIME header line.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid transfer or header encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Address that cannot be used for delivery.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// HTML-related attachments were given without an HTML body to relate to.
    #[error("HTML-related attachments require an HTML body")]
    RelatedWithoutHtml,

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),

    /// Reading attachment content failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Attaches a leaf index to an error raised while reading that leaf.
    ///
    /// Charset errors pass through untouched so callers can still match on
    /// the unsupported label.
    pub(crate) fn in_part(self, part: usize) -> Self {
        match self {
            Self::Parse { .. } | Self::Decode { .. } => self,
            other => Self::Parse {
                part,
                message: other.to_string(),
            },
        }
    }
}
