//! The transport capability the pool drives.
//!
//! [`Transport`] opens sessions and [`Connection`] runs envelope exchanges on
//! them. [`SmtpTransport`] implements both over `courier-smtp`; tests and
//! alternative protocols plug in their own.

use crate::classify::{Disposition, smtp_disposition};
use crate::config::{Config, Credentials, Security};
use courier_smtp::{Address, Client};
use std::future::Future;
use std::io;

/// Error type of a transport's connections.
pub type ConnectionError<T> = <<T as Transport>::Connection as Connection>::Error;

/// Optional features a connection may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The session can be switched to an encrypted channel.
    EncryptedUpgrade,
    /// The server accepts authentication.
    Authentication,
}

/// One open session with a mail server.
pub trait Connection: Send + Sized + 'static {
    /// Errors from the session.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks whether the server advertised a capability.
    fn supports(&self, capability: Capability) -> bool;

    /// Switches the session to an encrypted channel.
    fn upgrade_encrypted(
        self,
        server_name: &str,
    ) -> impl Future<Output = Result<Self, Self::Error>> + Send;

    /// Authenticates the session.
    fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Opens a transaction for `sender` (bare address).
    fn declare_sender(&mut self, sender: &str)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Adds one recipient (bare address).
    fn declare_recipient(
        &mut self,
        recipient: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends the serialized message and completes the transaction.
    fn stream_body(&mut self, body: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Abandons the current transaction, keeping the session.
    fn reset(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Ends the session. Failures are logged, not returned.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens connections for a pool.
pub trait Transport: Send + Sync + 'static {
    /// Connection type produced.
    type Connection: Connection;

    /// Opens and greets a new session.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError<Self>>> + Send;

    /// Default reuse classification for this transport's errors.
    fn classify(&self, error: &ConnectionError<Self>) -> Disposition {
        let _ = error;
        Disposition::Unknown
    }
}

/// Connects, then upgrades and authenticates as configured.
///
/// The upgrade happens only in [`Security::StartTls`] mode and when the
/// server offers it. Credentials are used only if the server accepts
/// authentication. A failed authentication closes the session.
pub(crate) async fn establish<T: Transport>(
    transport: &T,
    config: &Config,
) -> Result<T::Connection, ConnectionError<T>> {
    let mut connection = transport.connect().await?;

    if config.security == Security::StartTls && connection.supports(Capability::EncryptedUpgrade) {
        connection = connection.upgrade_encrypted(&config.host).await?;
    }

    if let Some(credentials) = &config.credentials {
        if connection.supports(Capability::Authentication) {
            if let Err(err) = connection.authenticate(credentials).await {
                connection.close().await;
                return Err(err);
            }
        }
    }

    Ok(connection)
}

/// SMTP over TCP, TLS or STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    host: String,
    port: u16,
    security: Security,
    helo_name: String,
    connect_timeout: std::time::Duration,
}

impl SmtpTransport {
    /// Creates a transport for the server in `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            security: config.security,
            helo_name: config.helo_name.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    async fn open(&self) -> courier_smtp::Result<Client> {
        let mut client = match self.security {
            Security::Implicit => Client::connect_tls(&self.host, self.port).await?,
            Security::None | Security::StartTls => Client::connect(&self.host, self.port).await?,
        };
        client.ehlo(&self.helo_name).await?;
        Ok(client)
    }
}

impl Transport for SmtpTransport {
    type Connection = SmtpConnection;

    async fn connect(&self) -> courier_smtp::Result<SmtpConnection> {
        tracing::debug!(host = %self.host, port = self.port, "connecting");
        let client = tokio::time::timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "SMTP connect timed out"))??;
        Ok(SmtpConnection::new(client))
    }

    fn classify(&self, error: &courier_smtp::Error) -> Disposition {
        smtp_disposition(error)
    }
}

/// An SMTP session usable by the pool.
#[derive(Debug)]
pub struct SmtpConnection {
    client: Client,
}

impl SmtpConnection {
    /// Wraps a client that has already sent EHLO.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl Connection for SmtpConnection {
    type Error = courier_smtp::Error;

    fn supports(&self, capability: Capability) -> bool {
        let info = self.client.server_info();
        match capability {
            Capability::EncryptedUpgrade => !self.client.is_encrypted() && info.supports_starttls(),
            Capability::Authentication => info.supports_auth(),
        }
    }

    async fn upgrade_encrypted(self, server_name: &str) -> courier_smtp::Result<Self> {
        Ok(Self::new(self.client.starttls(server_name).await?))
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> courier_smtp::Result<()> {
        self.client
            .authenticate(&credentials.username, &credentials.password)
            .await
    }

    async fn declare_sender(&mut self, sender: &str) -> courier_smtp::Result<()> {
        self.client.mail_from(&Address::new(sender)?, None).await
    }

    async fn declare_recipient(&mut self, recipient: &str) -> courier_smtp::Result<()> {
        self.client.rcpt_to(&Address::new(recipient)?).await
    }

    async fn stream_body(&mut self, body: &[u8]) -> courier_smtp::Result<()> {
        self.client.data().await?;
        self.client.send_message(body).await?;
        Ok(())
    }

    async fn reset(&mut self) -> courier_smtp::Result<()> {
        self.client.reset().await
    }

    async fn close(self) {
        if let Err(err) = self.client.quit().await {
            tracing::debug!(error = %err, "QUIT failed");
        }
    }
}
