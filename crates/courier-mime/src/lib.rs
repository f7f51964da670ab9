//! # courier-mime
//!
//! MIME message construction, serialization and parsing.
//!
//! ## Features
//!
//! - **Message model**: addresses, subject, text and HTML bodies, custom
//!   headers, regular and HTML-related attachments
//! - **Serialization**: picks the smallest multipart shape that fits the
//!   message (`alternative`, `related`, `mixed`), quoted-printable bodies,
//!   base64 attachments, RFC 2047 encoded headers
//! - **Parsing**: nested multiparts, base64/quoted-printable decoding, charset
//!   conversion to UTF-8, encoded header words
//!
//! ## Quick Start
//!
//! ### Building a message
//!
//! ```
//! use courier_mime::Message;
//!
//! let mut message = Message::new();
//! message
//!     .set_from("Jane Doe <jane@example.com>")
//!     .add_to("bob@example.com")
//!     .set_subject("Quarterly report")
//!     .set_text("Numbers attached.\n")
//!     .set_html("<p>Numbers attached.</p>\n");
//! message.attach(&b"a,b\n1,2\n"[..], "report.csv", "text/csv")?;
//!
//! let bytes = message.to_bytes()?;
//! assert!(bytes.starts_with(b"To: <bob@example.com>\r\n"));
//! # Ok::<(), courier_mime::Error>(())
//! ```
//!
//! ### Parsing a message
//!
//! ```
//! use courier_mime::Message;
//!
//! let raw = b"From: Jane <jane@example.com>\r\n\
//!             Subject: =?utf-8?q?Caf=C3=A9?=\r\n\
//!             \r\n\
//!             Hello!";
//! let message = Message::parse(raw)?;
//! assert_eq!(message.subject, "Café");
//! assert_eq!(message.text, b"Hello!");
//! # Ok::<(), courier_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;
mod parse;
mod render;

pub mod address;
pub mod encoding;
pub mod tree;

pub use address::{Mailbox, parse_address};
pub use content_type::{ContentDisposition, ContentType};
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Attachment, DEFAULT_ATTACHMENT_TYPE, Message, content_type_for_extension};
pub use tree::{MimeNode, MultipartKind, build_tree};
