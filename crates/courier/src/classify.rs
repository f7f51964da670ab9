//! Deciding whether a connection survives a failed delivery.

/// What a delivery error says about the connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The server rejected something but the session is intact.
    Reusable,
    /// The transport is gone or out of sync.
    Broken,
    /// Nothing is known; handled like [`Disposition::Broken`].
    Unknown,
}

impl Disposition {
    /// Returns true if the connection may go back to the pool.
    #[must_use]
    pub const fn is_reusable(self) -> bool {
        matches!(self, Self::Reusable)
    }
}

/// Maps transport errors to a [`Disposition`].
///
/// Any `Fn(&E) -> Disposition` closure is a classifier.
pub trait Classifier<E>: Send + Sync {
    /// Classifies one error.
    fn classify(&self, error: &E) -> Disposition;
}

impl<E, F> Classifier<E> for F
where
    F: Fn(&E) -> Disposition + Send + Sync,
{
    fn classify(&self, error: &E) -> Disposition {
        self(error)
    }
}

/// Classification used for SMTP sessions.
///
/// A reply from the server means the session is still in step, except 421
/// which announces that the server is closing the channel. Stream, TLS and
/// framing errors break the session.
#[must_use]
pub fn smtp_disposition(error: &courier_smtp::Error) -> Disposition {
    use courier_smtp::Error;

    match error {
        Error::SmtpError { code: 421, .. } => Disposition::Broken,
        Error::SmtpError { .. } => Disposition::Reusable,
        Error::Io(_) | Error::Tls(_) | Error::Protocol(_) => Disposition::Broken,
        _ => Disposition::Unknown,
    }
}
