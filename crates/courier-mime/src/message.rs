//! Message model: addresses, bodies, custom headers and attachments.

use crate::address::{self, Mailbox};
use crate::content_type::format_parameter;
use crate::error::Result;
use crate::header::Headers;
use crate::{parse, render};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Content type used when none is given or none can be guessed.
pub const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

/// An email message.
///
/// Address fields hold address text such as `Jane <jane@example.com>`; they
/// are parsed when the message is rendered or delivered. `text` and `html`
/// hold decoded bytes and are only transfer-encoded while rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Author address.
    pub from: String,
    /// Envelope sender override.
    pub sender: Option<String>,
    /// Reply-To addresses.
    pub reply_to: Vec<String>,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients, never rendered into the headers.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: Vec<u8>,
    /// HTML body.
    pub html: Vec<u8>,
    /// Extra headers. A name that matches a generated header replaces it.
    pub headers: Headers,
    /// Attachments in order.
    pub attachments: Vec<Attachment>,
    /// Addresses asking for a read receipt (Disposition-Notification-To).
    pub read_receipt: Vec<String>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From address.
    pub fn set_from(&mut self, from: impl Into<String>) -> &mut Self {
        self.from = from.into();
        self
    }

    /// Sets the envelope sender, used instead of From for `MAIL FROM`.
    pub fn set_sender(&mut self, sender: impl Into<String>) -> &mut Self {
        self.sender = Some(sender.into());
        self
    }

    /// Appends a Reply-To address.
    pub fn add_reply_to(&mut self, address: impl Into<String>) -> &mut Self {
        self.reply_to.push(address.into());
        self
    }

    /// Appends a To recipient.
    pub fn add_to(&mut self, address: impl Into<String>) -> &mut Self {
        self.to.push(address.into());
        self
    }

    /// Appends a Cc recipient.
    pub fn add_cc(&mut self, address: impl Into<String>) -> &mut Self {
        self.cc.push(address.into());
        self
    }

    /// Appends a Bcc recipient.
    pub fn add_bcc(&mut self, address: impl Into<String>) -> &mut Self {
        self.bcc.push(address.into());
        self
    }

    /// Appends a read receipt address.
    pub fn add_read_receipt(&mut self, address: impl Into<String>) -> &mut Self {
        self.read_receipt.push(address.into());
        self
    }

    /// Sets the subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain text body.
    pub fn set_text(&mut self, text: impl Into<Vec<u8>>) -> &mut Self {
        self.text = text.into();
        self
    }

    /// Sets the HTML body.
    pub fn set_html(&mut self, html: impl Into<Vec<u8>>) -> &mut Self {
        self.html = html.into();
        self
    }

    /// Adds a custom header value.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.add(name, value);
        self
    }

    /// Sets a custom header, replacing earlier values.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Reads an attachment from `reader` and appends it.
    ///
    /// An empty `content_type` becomes `application/octet-stream`. The
    /// returned reference can be used to adjust headers or mark the
    /// attachment as HTML-related.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub fn attach<R: Read>(
        &mut self,
        mut reader: R,
        filename: impl Into<String>,
        content_type: &str,
    ) -> Result<&mut Attachment> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.attachments
            .push(Attachment::new(filename, content_type, content));
        let last = self.attachments.len() - 1;
        Ok(&mut self.attachments[last])
    }

    /// Attaches a file, guessing its content type from the extension.
    ///
    /// The attachment is named after the last path component.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn attach_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Attachment> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or(DEFAULT_ATTACHMENT_TYPE);
        self.attach(file, filename, content_type)
    }

    /// Returns the envelope sender: Sender when set, otherwise From.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen address does not parse.
    pub fn envelope_sender(&self) -> Result<Mailbox> {
        address::parse_address(self.sender.as_deref().unwrap_or(&self.from))
    }

    /// Returns every To, Cc and Bcc recipient, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error for the first recipient that does not parse.
    pub fn envelope_recipients(&self) -> Result<Vec<Mailbox>> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|recipient| address::parse_address(recipient))
            .collect()
    }

    /// Serializes the message to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelatedWithoutHtml`] for an invalid structure
    /// and [`crate::Error::Render`] if writing fails.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        render::write_message(self, out)
    }

    /// Serializes the message to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the message structure is invalid.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Parses a message from its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        parse::parse_message(raw)
    }

    /// Reads and parses a message from `reader`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the message is malformed.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::parse(&raw)
    }
}

/// An attachment carried by a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Media type, e.g. `image/png`.
    pub content_type: String,
    /// Part headers. Missing Content-Disposition and Content-ID values are
    /// filled in when rendering.
    pub headers: Headers,
    /// Raw content.
    pub content: Vec<u8>,
    /// Rendered inline beside the HTML body instead of as a download.
    pub html_related: bool,
}

impl Attachment {
    /// Creates a regular attachment.
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: &str, content: Vec<u8>) -> Self {
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_ATTACHMENT_TYPE
        } else {
            content_type.trim()
        };
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type);
        Self {
            filename: filename.into(),
            content_type: content_type.to_string(),
            headers,
            content,
            html_related: false,
        }
    }

    /// Marks the attachment as related to the HTML body (inline).
    pub fn set_html_related(&mut self, related: bool) -> &mut Self {
        self.html_related = related;
        self
    }

    /// Disposition type used when no Content-Disposition header is set.
    #[must_use]
    pub const fn disposition(&self) -> &'static str {
        if self.html_related { "inline" } else { "attachment" }
    }

    /// Headers written for this attachment's part.
    pub(crate) fn part_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        if !headers.contains("Content-Type") {
            headers.set("Content-Type", self.content_type.as_str());
        }
        if !headers.contains("Content-Disposition") {
            headers.set(
                "Content-Disposition",
                format!(
                    "{}; {}",
                    self.disposition(),
                    format_parameter("filename", &self.filename)
                ),
            );
        }
        if !headers.contains("Content-ID") {
            headers.set("Content-ID", format!("<{}>", self.filename));
        }
        headers.set("Content-Transfer-Encoding", "base64");
        headers
    }
}

/// Guesses a media type from a file extension.
#[must_use]
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension.to_ascii_lowercase().as_str() {
        "avif" => "image/avif",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "gif" => "image/gif",
        "htm" | "html" => "text/html; charset=utf-8",
        "ics" => "text/calendar; charset=utf-8",
        "jpeg" | "jpg" => "image/jpeg",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "webp" => "image/webp",
        "xml" => "text/xml; charset=utf-8",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(content_type)
}
