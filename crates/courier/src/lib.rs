//! # courier
//!
//! Delivers MIME messages over a bounded pool of SMTP connections.
//!
//! ## Features
//!
//! - **Bounded pool**: at most `capacity` connections exist at once; they are
//!   built in the background on demand and handed out with a timeout
//! - **Error-driven reuse**: a server rejection resets the session and keeps
//!   it, a broken transport is discarded and replaced
//! - **Pluggable transport**: the pool drives any [`Transport`]; SMTP is the
//!   built-in one
//! - **Early validation**: addresses and rendering are checked before a
//!   connection is taken
//! - **One-shot delivery**: [`send`] delivers a single message over its own
//!   session when a pool is not worth keeping
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::{Config, Message, Pool};
//! use std::time::Duration;
//!
//! # async fn run() -> courier::Result<()> {
//! let config = Config::builder("smtp.example.com")
//!     .credentials("user@example.com", "password")
//!     .capacity(4)
//!     .build();
//! let pool = Pool::smtp(config);
//!
//! let mut message = Message::new();
//! message
//!     .set_from("Jane <jane@example.com>")
//!     .add_to("bob@example.com")
//!     .set_subject("Hello")
//!     .set_text("Hi Bob!\n");
//!
//! pool.send(&message, Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classify;
mod config;
mod delivery;
mod error;
mod pool;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use classify::{Classifier, Disposition};
pub use config::{Config, ConfigBuilder, Credentials, DEFAULT_CAPACITY, Security};
pub use delivery::{send, send_with};
pub use error::{Error, Result};
pub use pool::{Pool, Pooled};
pub use transport::{Capability, Connection, SmtpConnection, SmtpTransport, Transport};

pub use courier_mime::{self as mime, Message};
pub use courier_smtp as smtp;
