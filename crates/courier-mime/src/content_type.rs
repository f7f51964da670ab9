//! MIME content type and content disposition handling.

use crate::encoding::decode_charset;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Content type assumed for parts that do not declare one (RFC 2045).
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=us-ascii";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters with lowercase names (e.g., charset=utf-8, boundary=xxx).
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates a text/plain content type in UTF-8.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "UTF-8")
    }

    /// Creates a text/html content type in UTF-8.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "UTF-8")
    }

    /// Creates a multipart content type with the given subtype and boundary.
    #[must_use]
    pub fn multipart(sub_type: impl Into<String>, boundary: impl Into<String>) -> Self {
        Self::new("multipart", sub_type).with_parameter("boundary", boundary)
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a parameter by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| !b.is_empty())
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks the media type, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted; value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the media type is missing either half.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_outside_quotes(s, ';').into_iter();
        let media_type = segments.next().unwrap_or_default().trim();

        let (main_type, sub_type) = media_type
            .split_once('/')
            .map(|(main, sub)| (main.trim(), sub.trim()))
            .filter(|(main, sub)| !main.is_empty() && !sub.is_empty())
            .ok_or_else(|| Error::InvalidContentType(format!("missing type/subtype: {s:?}")))?;

        let mut content_type = Self::new(
            main_type.to_ascii_lowercase(),
            sub_type.to_ascii_lowercase(),
        );
        content_type.parameters = parse_parameters(segments);
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        write_parameters(f, &self.parameters)
    }
}

/// Content-Disposition header value (RFC 2183).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased ("inline", "attachment", ...).
    pub kind: String,
    /// Parameters with lowercase names.
    pub parameters: BTreeMap<String, String>,
}

impl ContentDisposition {
    /// Creates a disposition with a filename parameter.
    #[must_use]
    pub fn new(kind: impl Into<String>, filename: impl Into<String>) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("filename".to_string(), filename.into());
        Self {
            kind: kind.into(),
            parameters,
        }
    }

    /// Returns the filename parameter if present and non-empty.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters
            .get("filename")
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// True for `attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    /// True for `inline`.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.kind == "inline"
    }

    /// Parses a Content-Disposition value.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_outside_quotes(s, ';').into_iter();
        let kind = segments.next().unwrap_or_default().trim();
        if kind.is_empty() {
            return Err(Error::InvalidHeader(format!(
                "empty Content-Disposition: {s:?}"
            )));
        }
        Ok(Self {
            kind: kind.to_ascii_lowercase(),
            parameters: parse_parameters(segments),
        })
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        write_parameters(f, &self.parameters)
    }
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &BTreeMap<String, String>) -> fmt::Result {
    for (key, value) in parameters {
        if value.is_empty() || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
            write!(f, "; {key}=\"")?;
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str("\"")?;
        } else {
            write!(f, "; {key}={value}")?;
        }
    }
    Ok(())
}

fn split_outside_quotes(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' && in_quotes {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Extended `name*=charset'lang'value` parameters (RFC 2231) replace a
/// plain parameter of the same name once decoded.
fn parse_parameters<'a>(segments: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();
    let mut extended = Vec::new();

    for (key, value) in segments.filter_map(|segment| segment.split_once('=')) {
        let key = key.trim().to_ascii_lowercase();
        let value = unquote_value(value.trim());
        if key.is_empty() {
            continue;
        }
        match key.strip_suffix('*') {
            Some(name) if !name.is_empty() => extended.push((name.to_string(), value)),
            _ => {
                parameters.insert(key, value);
            }
        }
    }

    for (name, value) in extended {
        match decode_extended_value(&value) {
            Some(decoded) => {
                parameters.insert(name, decoded);
            }
            None => {
                parameters.insert(format!("{name}*"), value);
            }
        }
    }
    parameters
}

fn decode_extended_value(value: &str) -> Option<String> {
    let mut fields = value.splitn(3, '\'');
    let charset = fields.next()?;
    let _language = fields.next()?;
    let encoded = fields.next()?.as_bytes();

    let mut bytes = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        if encoded[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            bytes.push(u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?);
            i += 3;
        } else {
            bytes.push(encoded[i]);
            i += 1;
        }
    }

    let charset = if charset.is_empty() { "us-ascii" } else { charset };
    decode_charset(charset, &bytes).ok()
}

/// Formats one `name=value` parameter for a header.
///
/// ASCII values are quoted. Anything else uses the RFC 2231 form
/// `name*=utf-8''percent-encoded`, since encoded words are not allowed
/// inside quoted strings.
pub(crate) fn format_parameter(name: &str, value: &str) -> String {
    if value.is_ascii() {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("{name}=\"{escaped}\"");
    }

    let mut out = format!("{name}*=utf-8''");
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn unquote_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}
