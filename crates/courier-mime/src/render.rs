//! Message serialization.

use crate::address;
use crate::encoding::{encode_address_list, encode_header_text};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::Message;
use crate::tree::{MimeNode, build_tree};
use chrono::{Local, Utc};
use rand::Rng;
use std::borrow::Cow;
use std::io::Write;

/// Top-level headers the serializer can generate, in output order.
const GENERATED_HEADERS: [&str; 10] = [
    "Reply-To",
    "To",
    "Cc",
    "From",
    "Sender",
    "Subject",
    "Date",
    "Message-Id",
    "MIME-Version",
    "Disposition-Notification-To",
];

/// Headers whose values are lists of addresses.
const ADDRESS_HEADERS: [&str; 7] = [
    "From",
    "Sender",
    "To",
    "Cc",
    "Bcc",
    "Reply-To",
    "Disposition-Notification-To",
];

/// Headers written exactly as given.
const VERBATIM_HEADERS: [&str; 5] = [
    "Date",
    "Message-Id",
    "MIME-Version",
    "In-Reply-To",
    "References",
];

/// Headers that always describe the top-level body.
const BODY_HEADERS: [&str; 2] = ["Content-Type", "Content-Transfer-Encoding"];

pub(crate) fn write_message<W: Write>(message: &Message, out: &mut W) -> Result<()> {
    let tree = build_tree(message)?;
    let headers = message_headers(message, &tree);
    write_header_block(out, &headers)?;
    write_body(out, &tree)
}

fn message_headers(message: &Message, tree: &MimeNode<'_>) -> Headers {
    let mut headers = Headers::new();

    for name in GENERATED_HEADERS {
        let custom = message.headers.get_all(name);
        if custom.is_empty() {
            if let Some(value) = generated_value(message, name) {
                headers.add(name, value);
            }
        } else {
            for value in custom {
                headers.add(name, value.as_str());
            }
        }
    }

    for (name, values) in message.headers.entries() {
        if headers.contains(name) || is_one_of(name, &BODY_HEADERS) {
            continue;
        }
        for value in values {
            headers.add(name, value.as_str());
        }
    }

    match tree {
        MimeNode::Leaf(leaf) => {
            for name in BODY_HEADERS {
                if let Some(value) = leaf.headers.get(name) {
                    headers.set(name, value);
                }
            }
        }
        MimeNode::Multipart(multipart) => {
            headers.set("Content-Type", multipart.content_type().to_string());
        }
    }

    headers
}

fn generated_value(message: &Message, name: &str) -> Option<String> {
    let join = |addresses: &[String]| (!addresses.is_empty()).then(|| addresses.join(", "));
    match name {
        "Reply-To" => join(&message.reply_to),
        "To" => join(&message.to),
        "Cc" => join(&message.cc),
        "From" => (!message.from.is_empty()).then(|| message.from.clone()),
        "Sender" => message.sender.clone().filter(|sender| !sender.is_empty()),
        "Subject" => (!message.subject.is_empty()).then(|| message.subject.clone()),
        "Date" => Some(Local::now().to_rfc2822()),
        "Message-Id" => Some(generate_message_id(&message.from)),
        "MIME-Version" => Some("1.0".to_string()),
        "Disposition-Notification-To" => join(&message.read_receipt),
        _ => None,
    }
}

/// Generates `<random.timestamp@domain>`, taking the domain from `from`.
fn generate_message_id(from: &str) -> String {
    let domain = address::parse_address(from)
        .ok()
        .map(|mailbox| mailbox.domain().to_string())
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let random: u64 = rand::thread_rng().r#gen();
    format!("<{random:016x}.{}@{domain}>", Utc::now().timestamp_micros())
}

fn is_one_of(name: &str, names: &[&str]) -> bool {
    names.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

fn encode_field<'v>(name: &str, value: &'v str) -> Cow<'v, str> {
    if is_one_of(name, &ADDRESS_HEADERS) {
        Cow::Owned(encode_address_list(value))
    } else if is_one_of(name, &VERBATIM_HEADERS)
        || name.get(..8).is_some_and(|prefix| prefix.eq_ignore_ascii_case("content-"))
    {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(encode_header_text(value))
    }
}

fn emit<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes).map_err(Error::Render)
}

fn write_header_block<W: Write>(out: &mut W, headers: &Headers) -> Result<()> {
    for (name, value) in headers.iter() {
        let line = format!("{name}: {}\r\n", encode_field(name, value));
        emit(out, line.as_bytes())?;
    }
    emit(out, b"\r\n")
}

fn write_body<W: Write>(out: &mut W, node: &MimeNode<'_>) -> Result<()> {
    match node {
        MimeNode::Leaf(leaf) => emit(out, &leaf.encoding.encode(leaf.body)),
        MimeNode::Multipart(multipart) => {
            let boundary = &multipart.boundary;
            for (index, child) in multipart.children.iter().enumerate() {
                let delimiter = if index == 0 {
                    format!("--{boundary}\r\n")
                } else {
                    format!("\r\n--{boundary}\r\n")
                };
                emit(out, delimiter.as_bytes())?;
                write_part(out, child)?;
            }
            emit(out, format!("\r\n--{boundary}--\r\n").as_bytes())
        }
    }
}

fn write_part<W: Write>(out: &mut W, node: &MimeNode<'_>) -> Result<()> {
    match node {
        MimeNode::Leaf(leaf) => write_header_block(out, &leaf.headers)?,
        MimeNode::Multipart(multipart) => {
            let mut headers = Headers::new();
            headers.set("Content-Type", multipart.content_type().to_string());
            write_header_block(out, &headers)?;
        }
    }
    write_body(out, node)
}
