//! # courier-smtp
//!
//! Asynchronous SMTP client session (RFC 5321) used by the `courier` delivery
//! pool.
//!
//! ## Features
//!
//! - **Reusable sessions**: one [`Client`] can carry many mail transactions,
//!   with `RSET` between them
//! - **TLS**: implicit TLS (port 465) and STARTTLS via rustls
//! - **Authentication**: PLAIN and LOGIN
//! - **Custom streams**: any `AsyncRead + AsyncWrite` stream can carry a
//!   session, which is how in-process servers are tested
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier_smtp::{Address, Client};
//!
//! # async fn send() -> courier_smtp::Result<()> {
//! let mut client = Client::connect("smtp.example.com", 587).await?;
//! client.ehlo("client.example.com").await?;
//! let mut client = client.starttls("smtp.example.com").await?;
//! client.authenticate("user@example.com", "password").await?;
//!
//! client.mail_from(&Address::new("sender@example.com")?, None).await?;
//! client.rcpt_to(&Address::new("recipient@example.com")?).await?;
//! client.data().await?;
//! client.send_message(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
pub mod command;
pub mod connection;
mod error;
pub mod extension;
pub mod reply;

pub use address::Address;
pub use connection::{Client, Duplex, ServerInfo, SmtpStream};
pub use error::{Error, Result};
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode};
