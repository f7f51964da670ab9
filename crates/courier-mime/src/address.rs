//! Mailbox parsing and rendering for address headers.

use crate::encoding::encode_phrase_word;
use crate::error::{Error, Result};
use std::fmt;

/// A mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox {
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
    /// Bare address (e.g., "john@example.com").
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox without a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self {
            name: None,
            address,
        })
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }
}

/// Renders the mailbox the way it appears on a header line.
///
/// Names that are not pure ASCII become a Q-encoded word, ASCII names are
/// quoted unless they are a single atom, and a mailbox without a name
/// renders as `<address>`.
impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            None | Some("") => write!(f, "<{}>", self.address),
            Some(name) if !name.is_ascii() => {
                write!(f, "{} <{}>", encode_phrase_word(name), self.address)
            }
            Some(name) if name.bytes().all(is_atext) => write!(f, "{name} <{}>", self.address),
            Some(name) => {
                f.write_str("\"")?;
                for c in name.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "\" <{}>", self.address)
            }
        }
    }
}

/// Characters allowed in an unquoted atom (RFC 5322 section 3.2.3).
const fn is_atext(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

/// Parses one address entry such as `"Jane Doe" <jane@example.com>`,
/// `Jane <jane@example.com>` or `jane@example.com`.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if the entry has no usable address.
pub fn parse_address(text: &str) -> Result<Mailbox> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }

    let Some(open) = text.rfind('<') else {
        validate_address(text)?;
        return Ok(Mailbox {
            name: None,
            address: text.to_string(),
        });
    };

    let close = text[open..]
        .find('>')
        .map(|offset| open + offset)
        .ok_or_else(|| Error::InvalidAddress(format!("unterminated angle address: {text}")))?;
    if !text[close + 1..].trim().is_empty() {
        return Err(Error::InvalidAddress(format!(
            "unexpected text after address: {text}"
        )));
    }

    let address = text[open + 1..close].trim();
    validate_address(address)?;

    let name = unquote(text[..open].trim());
    Ok(Mailbox {
        name: (!name.is_empty()).then_some(name),
        address: address.to_string(),
    })
}

fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }
    if address.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
        return Err(Error::InvalidAddress(format!(
            "address contains invalid characters: {address}"
        )));
    }

    let Some((local, domain)) = address.rsplit_once('@') else {
        return Err(Error::InvalidAddress(format!("missing @ in {address}")));
    };
    if local.is_empty() {
        return Err(Error::InvalidAddress(format!("empty local part in {address}")));
    }
    if domain.is_empty() || domain.contains('@') {
        return Err(Error::InvalidAddress(format!("invalid domain in {address}")));
    }
    Ok(())
}

fn unquote(name: &str) -> String {
    let Some(inner) = name
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return name.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits an address list on commas that are outside quotes and angle
/// brackets. Empty entries are skipped.
#[must_use]
pub fn split_address_list(text: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                entries.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&text[start..]);

    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}
