//! SMTP client session.
//!
//! A [`Client`] is a single session with one server. Methods take `&mut self`
//! so the session can sit in a pool between transactions; the server enforces
//! command ordering and its rejections come back as [`Error::SmtpError`].

use super::{ServerInfo, SmtpStream, stream};
use crate::address::Address;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::extension::{AuthMechanism, Extension};
use crate::reply::{Reply, ReplyCode, is_last_reply_line, parse_reply};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Name announced in EHLO when the caller never sent one.
const DEFAULT_HELO: &str = "localhost";

/// An open SMTP session.
#[derive(Debug)]
pub struct Client {
    stream: SmtpStream,
    server_info: ServerInfo,
    helo_name: Option<String>,
}

impl Client {
    /// Connects over plain TCP and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the greeting is not 220.
    pub async fn connect(hostname: &str, port: u16) -> Result<Self> {
        Self::from_stream(stream::connect(hostname, port).await?).await
    }

    /// Connects with implicit TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails, or the greeting
    /// is not 220.
    pub async fn connect_tls(hostname: &str, port: u16) -> Result<Self> {
        Self::from_stream(stream::connect_tls(hostname, port).await?).await
    }

    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server refuses
    /// the session.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream)
            .await?
            .ensure(|code| code == ReplyCode::SERVICE_READY)?;

        let hostname = greeting
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(server = %hostname, "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                ..ServerInfo::default()
            },
            helo_name: None,
        })
    }

    /// Returns what the server advertised.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.stream.is_encrypted()
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the greeting.
    pub async fn ehlo(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?
            .ensure(ReplyCode::is_success)?;

        // The first line is the server's greeting text.
        self.server_info.set_extensions(reply.lines.iter().skip(1));
        self.helo_name = Some(client_hostname.to_string());
        Ok(())
    }

    /// Upgrades the session with STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server did not advertise STARTTLS
    /// or the stream cannot carry TLS, and any error from the handshake or
    /// the second EHLO.
    pub async fn starttls(mut self, server_name: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        if !self.stream.can_upgrade() {
            return Err(Error::NotSupported("STARTTLS on this stream".into()));
        }

        self.command(Command::StartTls)
            .await?
            .ensure(|code| code == ReplyCode::SERVICE_READY)?;

        self.stream = self.stream.upgrade_to_tls(server_name).await?;
        tracing::debug!(server = %server_name, "TLS established");

        // Extensions must be rediscovered after the upgrade.
        let helo = self
            .helo_name
            .take()
            .unwrap_or_else(|| DEFAULT_HELO.to_string());
        self.ehlo(&helo).await?;
        Ok(self)
    }

    /// Authenticates with the best mechanism both sides support.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if neither PLAIN nor LOGIN is offered,
    /// or the server's rejection.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let mechanisms = self.server_info.auth_mechanisms();
        if mechanisms.contains(&AuthMechanism::Plain) {
            self.auth_plain(username, password).await
        } else if mechanisms.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH PLAIN or LOGIN".into()))
        }
    }

    /// Authenticates using PLAIN.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let credentials = format!("\0{username}\0{password}");
        self.command(Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials)),
        })
        .await?
        .ensure(ReplyCode::is_success)?;
        tracing::debug!(mechanism = "PLAIN", "authenticated");
        Ok(())
    }

    /// Authenticates using LOGIN.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not prompt as expected or rejects
    /// the credentials.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let is_challenge = |code: ReplyCode| code == ReplyCode::AUTH_CONTINUE;
        self.command(Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        })
        .await?
        .ensure(is_challenge)?;
        self.command(Command::AuthResponse(STANDARD.encode(username)))
            .await?
            .ensure(is_challenge)?;
        self.command(Command::AuthResponse(STANDARD.encode(password)))
            .await?
            .ensure(ReplyCode::is_success)?;
        tracing::debug!(mechanism = "LOGIN", "authenticated");
        Ok(())
    }

    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for a non-ASCII path when the server
    /// lacks `SMTPUTF8`, or the server's rejection.
    pub async fn mail_from(&mut self, from: &Address, size: Option<usize>) -> Result<()> {
        let utf8 = !from.is_ascii();
        if utf8 && !self.server_info.supports(&Extension::SmtpUtf8) {
            return Err(Error::NotSupported("SMTPUTF8".into()));
        }
        let size = size.filter(|_| self.server_info.max_message_size().is_some());
        self.command(Command::MailFrom {
            from: from.clone(),
            size,
            utf8,
        })
        .await?
        .ensure(ReplyCode::is_success)?;
        Ok(())
    }

    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        self.command(Command::RcptTo { to: to.clone() })
            .await?
            .ensure(ReplyCode::is_success)?;
        Ok(())
    }

    /// Sends DATA and waits for the go-ahead.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 354.
    pub async fn data(&mut self) -> Result<()> {
        self.command(Command::Data)
            .await?
            .ensure(|code| code == ReplyCode::START_DATA)?;
        Ok(())
    }

    /// Sends the message content and the terminating dot, then waits for the
    /// server to accept it.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the server rejects the message.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<Reply> {
        self.stream.write_all(&dot_stuff(message)).await?;
        tracing::trace!(bytes = message.len(), "message data sent");
        let reply = read_reply(&mut self.stream).await?;
        reply.ensure(ReplyCode::is_success)
    }

    /// Aborts the current transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects RSET.
    pub async fn reset(&mut self) -> Result<()> {
        self.command(Command::Rset)
            .await?
            .ensure(ReplyCode::is_success)?;
        Ok(())
    }

    /// Checks that the session is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 2xx.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(Command::Noop)
            .await?
            .ensure(ReplyCode::is_success)?;
        Ok(())
    }

    /// Sends QUIT and closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT exchange fails.
    pub async fn quit(mut self) -> Result<()> {
        self.command(Command::Quit)
            .await?
            .ensure(ReplyCode::is_success)?;
        if let Err(err) = self.stream.shutdown().await {
            tracing::debug!(error = %err, "shutdown after QUIT failed");
        }
        Ok(())
    }

    async fn command(&mut self, command: Command) -> Result<Reply> {
        tracing::trace!(command = command.verb(), "SMTP command");
        self.stream.write_all(&command.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        tracing::trace!(command = command.verb(), code = reply.code.as_u16(), "SMTP reply");
        Ok(reply)
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }
        let is_last = is_last_reply_line(&line);
        lines.push(line);
        if is_last {
            break;
        }
    }
    parse_reply(&lines)
}

/// Applies CRLF normalization and dot-stuffing, and appends the final `.`.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
