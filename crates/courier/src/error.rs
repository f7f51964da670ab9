//! Error types for delivery.

use crate::classify::Disposition;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message could not be addressed or serialized. Raised before any
    /// connection is used.
    #[error("Message error: {0}")]
    Message(#[from] courier_mime::Error),

    /// To, Cc and Bcc are all empty.
    #[error("Message has no recipients")]
    NoRecipients,

    /// No connection became ready within the timeout.
    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    /// [`Error::PoolTimeout`] during a send.
    #[error("Timed out waiting for a connection to deliver on")]
    DeliveryTimeout,

    /// The envelope exchange failed.
    #[error("Transport error ({disposition:?}): {source}")]
    Transport {
        /// What happened to the connection afterwards.
        disposition: Disposition,
        /// Error raised by the transport.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
