//! Byte streams an SMTP session runs over.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore},
};

/// Any bidirectional byte stream, used for in-process servers and proxies.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// SMTP stream (TCP, TLS, or caller-provided).
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
    /// Stream supplied by the caller; cannot be upgraded to TLS.
    Other(BufReader<Box<dyn Duplex>>),
}

impl fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Tcp(_) => "Tcp",
            Self::Tls(_) => "Tls",
            Self::Other(_) => "Other",
        };
        f.debug_tuple("SmtpStream").field(&kind).finish()
    }
}

impl SmtpStream {
    /// Wraps an arbitrary duplex stream.
    pub fn from_duplex(stream: impl Duplex + 'static) -> Self {
        Self::Other(BufReader::new(Box::new(stream)))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Returns true if STARTTLS can be performed on this stream.
    #[must_use]
    pub const fn can_upgrade(&self) -> bool {
        matches!(self, Self::Tcp(_))
    }

    /// Reads one line, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the peer closed the stream.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
            Self::Other(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        line.truncate(line.trim_end_matches(['\r', '\n']).len());
        Ok(line)
    }

    /// Writes and flushes data.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Other(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, is not TCP, or the
    /// handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("already using TLS".into())),
            Self::Other(_) => {
                return Err(Error::NotSupported("TLS upgrade on a custom stream".into()));
            }
        };

        let tls_stream = tls_handshake(hostname, tcp_stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Shuts down the write half.
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
            Self::Other(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }
}

/// Connects over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects with implicit TLS (port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp_stream = TcpStream::connect((hostname, port)).await?;
    let tls_stream = tls_handshake(hostname, tcp_stream).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

async fn tls_handshake(hostname: &str, tcp_stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("invalid TLS server name: {hostname}")))?;
    Ok(create_tls_connector().connect(server_name, tcp_stream).await?)
}

/// Creates a TLS connector trusting the webpki root set.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_strips_line_ending() {
        let mock = tokio_test::io::Builder::new()
            .read(b"220 ready\r\n250 OK\n")
            .build();
        let mut stream = SmtpStream::from_duplex(mock);
        assert_eq!(stream.read_line().await.unwrap(), "220 ready");
        assert_eq!(stream.read_line().await.unwrap(), "250 OK");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = tokio_test::io::Builder::new().build();
        let mut stream = SmtpStream::from_duplex(mock);
        assert!(matches!(stream.read_line().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_custom_stream_cannot_upgrade() {
        let mock = tokio_test::io::Builder::new().build();
        let stream = SmtpStream::from_duplex(mock);
        assert!(!stream.is_encrypted());
        assert!(!stream.can_upgrade());
        assert!(matches!(
            stream.upgrade_to_tls("mail.example.com").await,
            Err(Error::NotSupported(_))
        ));
    }
}
