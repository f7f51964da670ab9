//! MIME tree construction for outgoing messages.
//!
//! The tree borrows body and attachment bytes from the [`Message`] it was
//! built from and only lives for the duration of one render.

use crate::content_type::ContentType;
use crate::encoding::TransferEncoding;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::{Attachment, Message};
use rand::Rng;
use std::fmt::Write as _;

/// Random bytes in a multipart boundary.
const BOUNDARY_BYTES: usize = 30;

/// Multipart flavours produced by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartKind {
    /// Body plus attachments.
    Mixed,
    /// Equivalent renderings of the same content.
    Alternative,
    /// HTML body plus the resources it references.
    Related,
}

impl MultipartKind {
    /// Returns the media subtype.
    #[must_use]
    pub const fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }
}

/// A single body part.
#[derive(Debug, Clone)]
pub struct Leaf<'a> {
    /// Part headers, including Content-Type and Content-Transfer-Encoding.
    pub headers: Headers,
    /// Raw (not yet transfer-encoded) body.
    pub body: &'a [u8],
    /// Encoding applied when the body is written.
    pub encoding: TransferEncoding,
}

/// A multipart container.
#[derive(Debug, Clone)]
pub struct Multipart<'a> {
    /// Multipart subtype.
    pub kind: MultipartKind,
    /// Boundary token separating the children.
    pub boundary: String,
    /// Child nodes, never empty.
    pub children: Vec<MimeNode<'a>>,
}

impl<'a> Multipart<'a> {
    fn new(kind: MultipartKind, children: Vec<MimeNode<'a>>) -> Self {
        Self {
            kind,
            boundary: generate_boundary(),
            children,
        }
    }

    /// Content-Type value announcing this container and its boundary.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        ContentType::multipart(self.kind.subtype(), self.boundary.as_str())
    }
}

/// A node of the MIME tree.
#[derive(Debug, Clone)]
pub enum MimeNode<'a> {
    /// Body part.
    Leaf(Leaf<'a>),
    /// Container of further nodes.
    Multipart(Multipart<'a>),
}

impl MimeNode<'_> {
    /// Number of leaves below (and including) this node.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Multipart(multipart) => multipart.children.iter().map(Self::leaf_count).sum(),
        }
    }
}

/// Builds the MIME tree for a message.
///
/// Text and HTML together form `multipart/alternative`. HTML-related
/// attachments wrap that body node in `multipart/related`, and regular
/// attachments wrap everything in `multipart/mixed`. A message with nothing
/// to send becomes an empty `text/plain` part.
///
/// # Errors
///
/// Returns [`Error::RelatedWithoutHtml`] if HTML-related attachments are
/// present but the HTML body is empty.
pub fn build_tree(message: &Message) -> Result<MimeNode<'_>> {
    let (related, regular): (Vec<&Attachment>, Vec<&Attachment>) = message
        .attachments
        .iter()
        .partition(|attachment| attachment.html_related);

    if !related.is_empty() && message.html.is_empty() {
        return Err(Error::RelatedWithoutHtml);
    }

    let text = (!message.text.is_empty()).then(|| text_leaf(ContentType::text_plain(), &message.text));
    let html = (!message.html.is_empty()).then(|| text_leaf(ContentType::text_html(), &message.html));

    let body = match (text, html) {
        (Some(text), Some(html)) => Some(MimeNode::Multipart(Multipart::new(
            MultipartKind::Alternative,
            vec![text, html],
        ))),
        (Some(node), None) | (None, Some(node)) => Some(node),
        (None, None) => None,
    };

    // Non-empty related implies an HTML body, so `body` is present here.
    let body = match body {
        Some(node) if !related.is_empty() => {
            let mut children = vec![node];
            children.extend(related.iter().copied().map(attachment_leaf));
            Some(MimeNode::Multipart(Multipart::new(MultipartKind::Related, children)))
        }
        other => other,
    };

    if regular.is_empty() {
        return Ok(body.unwrap_or_else(|| text_leaf(ContentType::text_plain(), &[])));
    }

    let mut children: Vec<MimeNode<'_>> = body.into_iter().collect();
    children.extend(regular.iter().copied().map(attachment_leaf));
    Ok(MimeNode::Multipart(Multipart::new(MultipartKind::Mixed, children)))
}

fn text_leaf(content_type: ContentType, body: &[u8]) -> MimeNode<'_> {
    let encoding = TransferEncoding::QuotedPrintable;
    let mut headers = Headers::new();
    headers.set("Content-Type", content_type.to_string());
    headers.set("Content-Transfer-Encoding", encoding.to_string());
    MimeNode::Leaf(Leaf {
        headers,
        body,
        encoding,
    })
}

fn attachment_leaf(attachment: &Attachment) -> MimeNode<'_> {
    MimeNode::Leaf(Leaf {
        headers: attachment.part_headers(),
        body: &attachment.content,
        encoding: TransferEncoding::Base64,
    })
}

/// Generates a fresh boundary: 30 random bytes as lowercase hex.
#[must_use]
pub fn generate_boundary() -> String {
    let mut rng = rand::thread_rng();
    let mut boundary = String::with_capacity(BOUNDARY_BYTES * 2);
    for _ in 0..BOUNDARY_BYTES {
        let _ = write!(boundary, "{:02x}", rng.r#gen::<u8>());
    }
    boundary
}
