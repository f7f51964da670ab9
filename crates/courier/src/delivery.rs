//! Sending messages through a pool.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::transport::{Connection, SmtpTransport, Transport, establish};
use courier_mime::{Mailbox, Message};
use std::time::Duration;

/// Envelope and wire bytes of a message ready to send.
struct Outgoing {
    sender: Mailbox,
    recipients: Vec<Mailbox>,
    body: Vec<u8>,
}

impl Outgoing {
    fn prepare(message: &Message) -> Result<Self> {
        let sender = message.envelope_sender()?;
        let recipients = message.envelope_recipients()?;
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }
        let body = message.to_bytes()?;
        Ok(Self {
            sender,
            recipients,
            body,
        })
    }
}

impl<T: Transport> Pool<T> {
    /// Delivers a message.
    ///
    /// The envelope sender is the Sender field if set, otherwise From. The
    /// recipients are To, Cc and Bcc, in that order. Display names are
    /// dropped. The message is addressed and serialized before a connection
    /// is taken from the pool.
    ///
    /// # Errors
    ///
    /// - [`Error::Message`] if an address does not parse or rendering fails
    /// - [`Error::NoRecipients`] if there is nobody to deliver to
    /// - [`Error::DeliveryTimeout`] if no connection became ready in time
    /// - [`Error::Transport`] if the server or the connection failed; the
    ///   connection has already been reused or discarded accordingly
    pub async fn send(&self, message: &Message, timeout: Duration) -> Result<()> {
        let outgoing = Outgoing::prepare(message)?;

        let mut connection = self.acquire(timeout).await.map_err(|err| match err {
            Error::PoolTimeout => Error::DeliveryTimeout,
            other => other,
        })?;

        let outcome = exchange(&mut *connection, &outgoing).await;
        let disposition = self.release(connection, outcome.as_ref().map(|_| ())).await;

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    sender = %outgoing.sender.address,
                    recipients = outgoing.recipients.len(),
                    bytes = outgoing.body.len(),
                    "message delivered"
                );
                Ok(())
            }
            Err(source) => Err(Error::Transport {
                disposition,
                source: Box::new(source),
            }),
        }
    }
}

/// Delivers one message over a fresh SMTP session, without a pool.
///
/// The session is set up as a pooled one would be (STARTTLS and AUTH per
/// `config`) and closed with QUIT afterwards, whatever the outcome.
///
/// # Errors
///
/// The same as [`Pool::send`], except that there is no delivery timeout.
/// Connection failures are reported as [`Error::Transport`].
pub async fn send(config: &Config, message: &Message) -> Result<()> {
    send_with(&SmtpTransport::new(config), config, message).await
}

/// Delivers one message over a fresh connection from `transport`.
///
/// # Errors
///
/// See [`send`].
pub async fn send_with<T: Transport>(transport: &T, config: &Config, message: &Message) -> Result<()> {
    let outgoing = Outgoing::prepare(message)?;
    let transport_error = |source: <T::Connection as Connection>::Error| Error::Transport {
        disposition: transport.classify(&source),
        source: Box::new(source),
    };

    let mut connection = establish(transport, config).await.map_err(transport_error)?;
    let outcome = exchange(&mut connection, &outgoing).await;
    connection.close().await;
    outcome.map_err(transport_error)?;

    tracing::debug!(
        sender = %outgoing.sender.address,
        recipients = outgoing.recipients.len(),
        bytes = outgoing.body.len(),
        "message delivered without pool"
    );
    Ok(())
}

/// Runs one envelope exchange; the first failure aborts it.
async fn exchange<C: Connection>(
    connection: &mut C,
    outgoing: &Outgoing,
) -> std::result::Result<(), C::Error> {
    connection.declare_sender(&outgoing.sender.address).await?;
    for recipient in &outgoing.recipients {
        connection.declare_recipient(&recipient.address).await?;
    }
    connection.stream_body(&outgoing.body).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::Disposition;
    use crate::test_support::{MockError, MockTransport};

    fn pool(transport: &MockTransport) -> Pool<MockTransport> {
        let config = Config::builder("mock.example.com").capacity(1).build();
        Pool::new(transport.clone(), config)
    }

    fn message() -> Message {
        let mut message = Message::new();
        message
            .set_from("Jane Doe <jane@example.com>")
            .add_to("Bob <bob@example.com>")
            .add_cc("carol@example.com")
            .add_bcc("dave@example.com")
            .set_subject("Hello")
            .set_text("Hi there\n");
        message
    }

    #[tokio::test]
    async fn test_send_drives_envelope_in_order() {
        let transport = MockTransport::default();
        let pool = pool(&transport);

        pool.send(&message(), Duration::from_secs(1)).await.unwrap();

        let log = transport.log();
        assert_eq!(
            log[..5],
            [
                "connect 0",
                "mail 0 jane@example.com",
                "rcpt 0 bob@example.com",
                "rcpt 0 carol@example.com",
                "rcpt 0 dave@example.com",
            ]
        );
        assert!(log[5].starts_with("data 0 "));

        let body = transport.last_body().unwrap();
        let parsed = Message::parse(&body).unwrap();
        assert_eq!(parsed.subject, "Hello");
        assert!(parsed.bcc.is_empty());
    }

    #[tokio::test]
    async fn test_sender_override() {
        let transport = MockTransport::default();
        let pool = pool(&transport);
        let mut message = message();
        message.set_sender("Mailer <bounces@example.com>");

        pool.send(&message, Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.log()[1], "mail 0 bounces@example.com");
    }

    #[tokio::test]
    async fn test_address_errors_surface_before_connecting() {
        let transport = MockTransport::default();
        let pool = pool(&transport);

        let mut bad_sender = message();
        bad_sender.set_from("not an address");
        let err = pool.send(&bad_sender, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Message(courier_mime::Error::InvalidAddress(_))
        ));

        let mut bad_rcpt = message();
        bad_rcpt.add_to("broken@");
        assert!(matches!(
            pool.send(&bad_rcpt, Duration::from_secs(1)).await,
            Err(Error::Message(_))
        ));

        assert_eq!(transport.connects(), 0);
        assert_eq!(pool.created(), 0);
    }

    #[tokio::test]
    async fn test_no_recipients() {
        let transport = MockTransport::default();
        let pool = pool(&transport);
        let mut message = Message::new();
        message.set_from("jane@example.com").set_text("nobody");

        assert!(matches!(
            pool.send(&message, Duration::from_secs(1)).await,
            Err(Error::NoRecipients)
        ));
        assert_eq!(transport.connects(), 0);
    }

    #[tokio::test]
    async fn test_render_error_before_connecting() {
        let transport = MockTransport::default();
        let pool = pool(&transport);
        let mut message = message();
        message
            .attach(&b"png"[..], "logo.png", "image/png")
            .unwrap()
            .set_html_related(true);

        assert!(matches!(
            pool.send(&message, Duration::from_secs(1)).await,
            Err(Error::Message(courier_mime::Error::RelatedWithoutHtml))
        ));
        assert_eq!(transport.connects(), 0);
    }

    #[tokio::test]
    async fn test_rejected_recipient_keeps_connection() {
        let transport = MockTransport::default();
        transport.reject_recipient("carol@example.com");
        let pool = pool(&transport);

        let err = pool.send(&message(), Duration::from_secs(1)).await.unwrap_err();
        let Error::Transport { disposition, source } = err else {
            panic!("expected a transport error");
        };
        assert_eq!(disposition, Disposition::Reusable);
        assert!(source.to_string().contains("carol@example.com"));
        assert_eq!(pool.created(), 1);

        // Aborted at the rejected recipient, then reset.
        let log = transport.log();
        assert_eq!(log.last().unwrap(), "reset 0");
        assert!(!log.iter().any(|line| line.contains("dave@example.com")));

        let mut retry = message();
        retry.cc.clear();
        pool.send(&retry, Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test]
    async fn test_broken_transport_discards_connection() {
        let transport = MockTransport::default();
        transport.break_on_body();
        let pool = pool(&transport);

        let err = pool.send(&message(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                disposition: Disposition::Broken,
                ..
            }
        ));
        assert_eq!(pool.created(), 0);
        assert!(err.to_string().contains("Broken"));

        transport.heal();
        pool.send(&message(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_timeout() {
        let transport = MockTransport::default();
        let pool = pool(&transport);
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        assert!(matches!(
            pool.send(&message(), Duration::from_millis(100)).await,
            Err(Error::DeliveryTimeout)
        ));
    }

    #[tokio::test]
    async fn test_send_with_uses_one_session() {
        let transport = MockTransport::default();
        transport.advertise_all();
        let config = Config::builder("mock.example.com")
            .credentials("user", "secret")
            .build();

        send_with(&transport, &config, &message()).await.unwrap();

        let log = transport.log();
        assert_eq!(
            log[..4],
            [
                "connect 0",
                "upgrade 0 mock.example.com",
                "auth 0 user",
                "mail 0 jane@example.com",
            ]
        );
        assert_eq!(log.last().unwrap(), "close 0");
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test]
    async fn test_send_with_closes_after_rejection() {
        let transport = MockTransport::default();
        transport.reject_recipient("bob@example.com");
        let config = Config::new("mock.example.com");

        let err = send_with(&transport, &config, &message()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                disposition: Disposition::Reusable,
                ..
            }
        ));
        assert_eq!(transport.log().last().unwrap(), "close 0");
    }

    #[tokio::test]
    async fn test_send_with_connect_failure() {
        let transport = MockTransport::default();
        transport.fail_next_connects(1);
        let config = Config::new("mock.example.com");

        let err = send_with(&transport, &config, &message()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                disposition: Disposition::Broken,
                ..
            }
        ));
        assert!(transport.log().is_empty());
    }

    #[tokio::test]
    async fn test_send_with_validates_before_connecting() {
        let transport = MockTransport::default();
        let mut message = Message::new();
        message.set_from("jane@example.com").set_text("nobody");

        assert!(matches!(
            send_with(&transport, &Config::new("mock.example.com"), &message).await,
            Err(Error::NoRecipients)
        ));
        assert_eq!(transport.connects(), 0);
    }

    #[test]
    fn test_mock_error_is_std_error() {
        let error: Box<dyn std::error::Error + Send + Sync> =
            Box::new(MockError::Broken("gone".into()));
        assert_eq!(error.to_string(), "broken: gone");
    }
}
