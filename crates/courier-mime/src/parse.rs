//! Message parsing.
//!
//! Nested multiparts are flattened into one ordered list of leaves before
//! the leaves are sorted into bodies and attachments.

use crate::address::split_address_list;
use crate::content_type::{ContentDisposition, ContentType, DEFAULT_CONTENT_TYPE};
use crate::encoding::{TransferEncoding, decode_header, decode_text_body};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::{Attachment, Message};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

/// A decoded leaf part.
struct RawLeaf {
    headers: Headers,
    content_type: ContentType,
    body: Vec<u8>,
}

pub(crate) fn parse_message(raw: &[u8]) -> Result<Message> {
    let raw = raw.trim_ascii_start();
    let (header_bytes, body) = split_header_block(raw);
    let mut headers = Headers::parse(&header_text(header_bytes)).map_err(|e| e.in_part(0))?;
    let content_type = content_type_of(&headers).map_err(|e| e.in_part(0))?;

    let mut message = Message::new();
    take_address_fields(&mut headers, &mut message).map_err(|e| e.in_part(0))?;

    if content_type.is_multipart() {
        let mut leaves = Vec::new();
        collect_leaves(&content_type, body, &mut leaves)?;
        classify(leaves, &mut message)?;
    } else {
        let body = transfer_encoding_of(&headers)
            .and_then(|encoding| encoding.decode(body))
            .map_err(|e| e.in_part(0))?;
        let body = decode_text_body(content_type.charset(), body)?;
        if content_type.is("text", "html") {
            message.html = body;
        } else {
            message.text = body;
        }
    }

    message.headers = headers;
    Ok(message)
}

/// Splits at the first empty line. Without one, everything is header.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while pos < raw.len() {
        let end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |offset| pos + offset + 1);
        let line = &raw[pos..end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..pos], &raw[end..]);
        }
        pos = end;
    }
    (raw, &raw[raw.len()..])
}

/// Header bytes should be ASCII; stray 8-bit bytes are read as Windows-1252.
fn header_text(bytes: &[u8]) -> Cow<'_, str> {
    std::str::from_utf8(bytes).map_or_else(
        |_| WINDOWS_1252.decode_without_bom_handling(bytes).0,
        Cow::Borrowed,
    )
}

fn content_type_of(headers: &Headers) -> Result<ContentType> {
    ContentType::parse(headers.get("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE))
}

fn transfer_encoding_of(headers: &Headers) -> Result<TransferEncoding> {
    headers
        .get("Content-Transfer-Encoding")
        .map_or(Ok(TransferEncoding::SevenBit), str::parse)
}

fn take_address_fields(headers: &mut Headers, message: &mut Message) -> Result<()> {
    message.subject = first_decoded(headers.remove("Subject"))?.unwrap_or_default();
    message.from = first_decoded(headers.remove("From"))?.unwrap_or_default();
    message.sender = first_decoded(headers.remove("Sender"))?;
    message.to = decoded_list(&headers.remove("To"))?;
    message.cc = decoded_list(&headers.remove("Cc"))?;
    message.bcc = decoded_list(&headers.remove("Bcc"))?;
    message.reply_to = decoded_list(&headers.remove("Reply-To"))?;
    message.read_receipt = decoded_list(&headers.remove("Disposition-Notification-To"))?;
    Ok(())
}

fn first_decoded(values: Vec<String>) -> Result<Option<String>> {
    values
        .first()
        .map(|value| decode_header(value))
        .transpose()
}

/// Address lists are split before decoding so that encoded commas stay
/// inside their entry.
fn decoded_list(values: &[String]) -> Result<Vec<String>> {
    values
        .iter()
        .flat_map(|value| split_address_list(value))
        .map(decode_header)
        .collect()
}

fn collect_leaves(content_type: &ContentType, body: &[u8], leaves: &mut Vec<RawLeaf>) -> Result<()> {
    let part = leaves.len();
    let boundary = content_type.boundary().ok_or_else(|| Error::Parse {
        part,
        message: format!("{} without boundary parameter", content_type.essence()),
    })?;
    let sections = split_sections(body, boundary).map_err(|message| Error::Parse { part, message })?;

    for section in sections {
        let index = leaves.len();
        let (header_bytes, section_body) = split_header_block(section);
        let headers = Headers::parse(&header_text(header_bytes)).map_err(|e| e.in_part(index))?;
        let section_type = content_type_of(&headers).map_err(|e| e.in_part(index))?;

        if section_type.is_multipart() {
            collect_leaves(&section_type, section_body, leaves)?;
            continue;
        }

        let body = transfer_encoding_of(&headers)
            .and_then(|encoding| encoding.decode(section_body))
            .map_err(|e| e.in_part(index))?;
        leaves.push(RawLeaf {
            headers,
            content_type: section_type,
            body,
        });
    }
    Ok(())
}

/// Returns the sections between `--boundary` lines, excluding preamble and
/// epilogue. The line break before each delimiter belongs to the delimiter.
fn split_sections<'a>(body: &'a [u8], boundary: &str) -> std::result::Result<Vec<&'a [u8]>, String> {
    let delimiter = format!("--{boundary}");
    let mut sections = Vec::new();
    let mut section_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |offset| pos + offset + 1);
        let line = body[pos..end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest == b"--";
            if closing || rest.is_empty() {
                if let Some(start) = section_start {
                    sections.push(&body[start..strip_line_break(body, start, pos)]);
                }
                if closing {
                    return Ok(sections);
                }
                section_start = Some(end);
            }
        }
        pos = end;
    }

    if section_start.is_none() {
        Err(format!("missing opening delimiter --{boundary}"))
    } else {
        Err(format!("body truncated before closing delimiter --{boundary}--"))
    }
}

fn strip_line_break(body: &[u8], start: usize, end: usize) -> usize {
    let mut end = end;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn classify(leaves: Vec<RawLeaf>, message: &mut Message) -> Result<()> {
    let mut have_text = false;
    let mut have_html = false;

    for (index, leaf) in leaves.into_iter().enumerate() {
        let disposition = leaf
            .headers
            .get("Content-Disposition")
            .map(ContentDisposition::parse)
            .transpose()
            .map_err(|e| e.in_part(index))?;
        let downloadable = disposition
            .as_ref()
            .is_some_and(|d| d.is_attachment() || (d.is_inline() && d.filename().is_some()));

        if !downloadable && !have_text && leaf.content_type.is("text", "plain") {
            message.text = decode_text_body(leaf.content_type.charset(), leaf.body)?;
            have_text = true;
        } else if !downloadable && !have_html && leaf.content_type.is("text", "html") {
            message.html = decode_text_body(leaf.content_type.charset(), leaf.body)?;
            have_html = true;
        } else {
            message.attachments.push(into_attachment(leaf, disposition.as_ref()));
        }
    }
    Ok(())
}

fn into_attachment(leaf: RawLeaf, disposition: Option<&ContentDisposition>) -> Attachment {
    let filename = disposition
        .and_then(ContentDisposition::filename)
        .or_else(|| leaf.content_type.parameter("name"))
        .unwrap_or_default()
        .to_string();
    Attachment {
        filename,
        content_type: leaf.content_type.essence(),
        headers: leaf.headers,
        content: leaf.body,
        html_related: disposition.is_some_and(ContentDisposition::is_inline),
    }
}
