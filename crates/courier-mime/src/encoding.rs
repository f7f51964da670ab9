//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header encoding and charset
//! conversion of decoded text.

use crate::address;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// Maximum line length for encoded body lines, excluding CRLF.
pub const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes per Base64 line; 57 bytes encode to exactly 76 characters.
const BASE64_LINE_BYTES: usize = 57;

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Content-Transfer-Encoding of a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Encodes a raw body for the wire.
    #[must_use]
    pub fn encode(self, body: &[u8]) -> Cow<'_, [u8]> {
        match self {
            Self::Base64 => Cow::Owned(encode_base64_wrapped(body)),
            Self::QuotedPrintable => Cow::Owned(encode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Cow::Borrowed(body),
        }
    }

    /// Decodes a body read from the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for this encoding.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => decode_quoted_printable(body),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl FromStr for TransferEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "base64" => Ok(Self::Base64),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "binary" => Ok(Self::Binary),
            other => Err(Error::InvalidEncoding(format!(
                "unknown Content-Transfer-Encoding: {other}"
            ))),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Encodes a body using Quoted-Printable encoding (RFC 2045).
///
/// Line feeds become CRLF line breaks. Every other line is broken with a
/// soft break (`=` CRLF) before it would reach 76 characters, and output
/// that does not end on a line break gets a trailing soft break. A space or
/// tab directly before a line feed is escaped, since decoders strip
/// unescaped trailing whitespace.
#[must_use]
pub fn encode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 2);
    let mut column = 0;

    for (i, &byte) in input.iter().enumerate() {
        if byte == b'\n' {
            out.extend_from_slice(b"\r\n");
            column = 0;
            continue;
        }

        let escaped = [
            b'=',
            HEX_UPPER[usize::from(byte >> 4)],
            HEX_UPPER[usize::from(byte & 0x0f)],
        ];
        let before_break = matches!(byte, b' ' | b'\t') && input.get(i + 1) == Some(&b'\n');
        let token: &[u8] = if is_qp_literal(byte) && !before_break {
            std::slice::from_ref(&byte)
        } else {
            &escaped
        };

        if column + token.len() >= MAX_LINE_LENGTH {
            out.extend_from_slice(b"=\r\n");
            column = 0;
        }
        out.extend_from_slice(token);
        column += token.len();
    }

    if column > 0 {
        out.extend_from_slice(b"=\r\n");
    }
    out
}

const fn is_qp_literal(byte: u8) -> bool {
    matches!(byte, b'!'..=b'<' | b'>'..=b'~' | b' ' | b'\t')
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed and trailing whitespace before a line break
/// is dropped. Hard line breaks are kept exactly as they appear in the input.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());

    for line in input.split_inclusive(|&b| b == b'\n') {
        let (content, ending) = split_line_ending(line);
        let content = content.trim_ascii_end();

        if let Some(soft) = content.strip_suffix(b"=") {
            decode_qp_run(soft, &mut out)?;
        } else {
            decode_qp_run(content, &mut out)?;
            out.extend_from_slice(ending);
        }
    }

    Ok(out)
}

fn split_line_ending(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(content) = line.strip_suffix(b"\r\n") {
        (content, b"\r\n")
    } else if let Some(content) = line.strip_suffix(b"\n") {
        (content, b"\n")
    } else {
        (line, b"")
    }
}

fn decode_qp_run(run: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut i = 0;
    while i < run.len() {
        if run[i] == b'=' {
            let byte = run
                .get(i + 1..i + 3)
                .and_then(hex_pair)
                .ok_or_else(|| {
                    Error::InvalidEncoding(format!(
                        "invalid quoted-printable escape at byte {i}"
                    ))
                })?;
            out.push(byte);
            i += 3;
        } else {
            out.push(run[i]);
            i += 1;
        }
    }
    Ok(())
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let digit = |b: u8| char::from(b).to_digit(16);
    let high = digit(pair[0])?;
    let low = digit(pair[1])?;
    u8::try_from(high * 16 + low).ok()
}

/// Encodes data as Base64 in lines of 76 characters, each ending in CRLF.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> Vec<u8> {
    let lines = data.len().div_ceil(BASE64_LINE_BYTES);
    let mut out = String::with_capacity(lines * (MAX_LINE_LENGTH + 2));
    for chunk in data.chunks(BASE64_LINE_BYTES) {
        STANDARD.encode_string(chunk, &mut out);
        out.push_str("\r\n");
    }
    out.into_bytes()
}

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact).map_err(Into::into)
}

/// Encodes free header text (such as a subject) for a header line.
///
/// Pure ASCII text is returned unchanged. Anything else becomes a single
/// UTF-8 Q-encoded word.
#[must_use]
pub fn encode_header_text(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut word = String::with_capacity(value.len() * 3 + 12);
    word.push_str("=?UTF-8?q?");
    for &byte in value.as_bytes() {
        match byte {
            b' ' => word.push('_'),
            b'=' | b'?' | b'_' => push_hex(&mut word, byte),
            b'!'..=b'~' => word.push(char::from(byte)),
            _ => push_hex(&mut word, byte),
        }
    }
    word.push_str("?=");
    word
}

/// Encodes a display name as a UTF-8 Q-encoded word usable in a phrase.
///
/// Only characters that RFC 2047 allows inside a phrase word stay literal.
pub(crate) fn encode_phrase_word(name: &str) -> String {
    let mut word = String::with_capacity(name.len() * 3 + 12);
    word.push_str("=?utf-8?q?");
    for &byte in name.as_bytes() {
        match byte {
            b' ' => word.push('_'),
            b'!' | b'*' | b'+' | b'-' | b'/' => word.push(char::from(byte)),
            _ if byte.is_ascii_alphanumeric() => word.push(char::from(byte)),
            _ => push_hex(&mut word, byte),
        }
    }
    word.push_str("?=");
    word
}

fn push_hex(out: &mut String, byte: u8) {
    let _ = write!(out, "={byte:02X}");
}

/// Encodes a comma-separated address list for an address header.
///
/// Entries that parse as addresses are re-rendered with their display names
/// quoted or Q-encoded as needed. Entries that do not parse are kept as
/// trimmed text.
#[must_use]
pub fn encode_address_list(value: &str) -> String {
    address::split_address_list(value)
        .into_iter()
        .map(|entry| {
            address::parse_address(entry)
                .map_or_else(|_| entry.trim().to_string(), |mailbox| mailbox.to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decodes RFC 2047 encoded words in a header value.
///
/// Supports the B and Q encodings in any charset known to `encoding_rs`.
/// Whitespace between two adjacent encoded words is dropped; text that only
/// looks like the start of an encoded word is kept literally.
///
/// # Errors
///
/// Returns an error if an encoded word names an unknown charset or carries
/// malformed data.
pub fn decode_header(value: &str) -> Result<String> {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (literal, candidate) = rest.split_at(start);
        if let Some((word, consumed)) = EncodedWord::split(candidate) {
            if !(after_word && literal.chars().all(char::is_whitespace)) {
                decoded.push_str(literal);
            }
            decoded.push_str(&word.decode()?);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            decoded.push_str(literal);
            decoded.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    decoded.push_str(rest);
    Ok(decoded)
}

/// One `=?charset?scheme?text?=` token.
struct EncodedWord<'a> {
    charset: &'a str,
    base64: bool,
    text: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// Splits an encoded word off the front of `input`, returning it with the
    /// number of bytes it spans.
    fn split(input: &'a str) -> Option<(Self, usize)> {
        let body = input.strip_prefix("=?")?;
        let (charset, rest) = body.split_once('?')?;
        let (scheme, rest) = rest.split_once('?')?;
        let end = rest.find("?=")?;

        if charset.is_empty() || charset.contains(char::is_whitespace) {
            return None;
        }
        let base64 = match scheme {
            "B" | "b" => true,
            "Q" | "q" => false,
            _ => return None,
        };

        let consumed = 2 + charset.len() + 1 + scheme.len() + 1 + end + 2;
        let word = Self {
            charset,
            base64,
            text: &rest[..end],
        };
        Some((word, consumed))
    }

    fn decode(&self) -> Result<String> {
        let bytes = if self.base64 {
            decode_base64(self.text.as_bytes())?
        } else {
            decode_q(self.text)?
        };
        // RFC 2231 allows a language suffix: utf-8*en
        let charset = self.charset.split('*').next().unwrap_or(self.charset);
        decode_charset(charset, &bytes)
    }
}

fn decode_q(text: &str) -> Result<Vec<u8>> {
    let underscored: Vec<u8> = text
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    let mut out = Vec::with_capacity(underscored.len());
    decode_qp_run(&underscored, &mut out)?;
    Ok(out)
}

/// Converts text in the named charset to a `String`.
///
/// # Errors
///
/// Returns [`Error::Decode`] for a charset label `encoding_rs` does not know,
/// and an encoding error when the bytes are malformed for the charset.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String> {
    let (label, encoding) = lookup_charset(charset)?;
    if encoding == UTF_8 {
        return Ok(String::from_utf8(bytes.to_vec())?);
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(Error::InvalidEncoding(format!("malformed {label} text")));
    }
    Ok(text.into_owned())
}

/// Converts a decoded text body to UTF-8.
///
/// Bodies without a charset, labelled UTF-8, or pure ASCII in an
/// ASCII-compatible charset are returned unchanged.
///
/// # Errors
///
/// Returns an error if the charset is unknown or the body is malformed.
pub fn decode_text_body(charset: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>> {
    let Some(charset) = charset else {
        return Ok(body);
    };
    let (_, encoding) = lookup_charset(charset)?;
    if encoding == UTF_8 || (encoding.is_ascii_compatible() && body.is_ascii()) {
        return Ok(body);
    }
    decode_charset(charset, &body).map(String::into_bytes)
}

fn lookup_charset(charset: &str) -> Result<(&str, &'static Encoding)> {
    let label = charset.trim().trim_matches('"');
    Encoding::for_label(label.as_bytes())
        .map(|encoding| (label, encoding))
        .ok_or_else(|| Error::Decode {
            charset: label.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_raw_string_hashes)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quoted_printable_encode_long_lines() {
        let input = concat!(
            "Dear reader!\n\n",
            "This is a test email to try and capture some of the corner cases that exist within\n",
            "the quoted-printable encoding.\n",
            "There are some wacky parts like =, and this input assumes UNIX line breaks so\n",
            "it can come out a little weird.  Also, we need to support unicode so here's a fish: 🐟\n",
        );
        let expected = concat!(
            "Dear reader!\r\n\r\n",
            "This is a test email to try and capture some of the corner cases that exist=\r\n",
            " within\r\n",
            "the quoted-printable encoding.\r\n",
            "There are some wacky parts like =3D, and this input assumes UNIX line break=\r\n",
            "s so\r\n",
            "it can come out a little weird.  Also, we need to support unicode so here's=\r\n",
            " a fish: =F0=9F=90=9F\r\n",
        );

        let encoded = encode_quoted_printable(input.as_bytes());
        assert_eq!(String::from_utf8(encoded).unwrap(), expected);
    }

    #[test]
    fn test_quoted_printable_encode_trailing_soft_break() {
        assert_eq!(encode_quoted_printable(b"abc"), b"abc=\r\n");
        assert_eq!(
            encode_quoted_printable("Needs Encóding".as_bytes()),
            b"Needs Enc=C3=B3ding=\r\n"
        );
        assert!(encode_quoted_printable(b"").is_empty());
    }

    #[test]
    fn test_quoted_printable_escape_not_split() {
        let input = format!("{}é", "a".repeat(73));
        let expected = format!("{}=\r\n=C3=A9=\r\n", "a".repeat(73));
        let encoded = encode_quoted_printable(input.as_bytes());
        assert_eq!(String::from_utf8(encoded).unwrap(), expected);
    }

    #[test]
    fn test_quoted_printable_encode_carriage_return() {
        assert_eq!(encode_quoted_printable(b"a\r\nb"), b"a=0D\r\nb=\r\n");
    }

    #[test]
    fn test_quoted_printable_escapes_whitespace_before_break() {
        assert_eq!(
            encode_quoted_printable(b"signature: \nend\t\n"),
            b"signature:=20\r\nend=09\r\n"
        );
        assert_eq!(encode_quoted_printable(b"a b\n"), b"a b\r\n");
        assert_eq!(encode_quoted_printable(b"tail "), b"tail =\r\n");
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"Hello=2C World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable(b"Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");

        let decoded = decode_quoted_printable(b"a fish: =F0=9F=90=9F=\r\n").unwrap();
        assert_eq!(decoded, "a fish: 🐟".as_bytes());
    }

    #[test]
    fn test_quoted_printable_keeps_hard_breaks() {
        let decoded = decode_quoted_printable(b"one  \r\ntwo\nthree").unwrap();
        assert_eq!(decoded, b"one\r\ntwo\nthree");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        let err = decode_quoted_printable(b"bad =ZZ escape").unwrap_err();
        assert!(matches!(err, Error::InvalidEncoding(_)));
        assert!(decode_quoted_printable(b"short =A").is_err());
    }

    #[test]
    fn test_base64_wrapped() {
        let file = concat!(
            "I'm a file long enough to force the function to wrap a\n",
            "couple of lines, but I stop short of the end of one line and\n",
            "have some padding dangling at the end."
        );
        let expected = concat!(
            "SSdtIGEgZmlsZSBsb25nIGVub3VnaCB0byBmb3JjZSB0aGUgZnVuY3Rpb24gdG8gd3JhcCBhCmNv\r\n",
            "dXBsZSBvZiBsaW5lcywgYnV0IEkgc3RvcCBzaG9ydCBvZiB0aGUgZW5kIG9mIG9uZSBsaW5lIGFu\r\n",
            "ZApoYXZlIHNvbWUgcGFkZGluZyBkYW5nbGluZyBhdCB0aGUgZW5kLg==\r\n",
        );

        let encoded = encode_base64_wrapped(file.as_bytes());
        assert_eq!(String::from_utf8(encoded.clone()).unwrap(), expected);
        assert_eq!(decode_base64(&encoded).unwrap(), file.as_bytes());
    }

    #[test]
    fn test_base64_empty() {
        assert!(encode_base64_wrapped(b"").is_empty());
        assert!(decode_base64(b"").unwrap().is_empty());
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(matches!(
            decode_base64(b"not base64!").unwrap_err(),
            Error::Base64Decode(_)
        ));
    }

    #[test]
    fn test_encode_header_text() {
        assert_eq!(encode_header_text("Plain subject"), "Plain subject");
        assert_eq!(
            encode_header_text("Subject with a 🐟"),
            "=?UTF-8?q?Subject_with_a_=F0=9F=90=9F?="
        );
        assert_eq!(encode_header_text("é=?_"), "=?UTF-8?q?=C3=A9=3D=3F=5F?=");
    }

    #[test]
    fn test_encode_address_list() {
        assert_eq!(
            encode_address_list(
                "Needs Encóding <encoding@example.com>, Only ASCII <foo@example.com>"
            ),
            "=?utf-8?q?Needs_Enc=C3=B3ding?= <encoding@example.com>, \"Only ASCII\" <foo@example.com>"
        );
        assert_eq!(
            encode_address_list("Keith Moore <moore@cs.utk.edu>, Keld Jørn Simonsen <keld@dkuug.dk>"),
            "\"Keith Moore\" <moore@cs.utk.edu>, =?utf-8?q?Keld_J=C3=B8rn_Simonsen?= <keld@dkuug.dk>"
        );
        assert_eq!(
            encode_address_list("\"Test :)\" <test@localhost>"),
            "\"Test :)\" <test@localhost>"
        );
        assert_eq!(
            encode_address_list("bare@example.com"),
            "<bare@example.com>"
        );
    }

    #[test]
    fn test_decode_header_q_latin1() {
        let decoded = decode_header(
            "Mrs =?ISO-8859-1?Q?Val=C3=A9rie=20Dupont?= <valerie.dupont@example.com>",
        )
        .unwrap();
        assert_eq!(decoded, "Mrs ValÃ©rie Dupont <valerie.dupont@example.com>");

        let decoded = decode_header("=?ISO-8859-1?Q?Patrik_F=E4ltstr=F6m?=").unwrap();
        assert_eq!(decoded, "Patrik Fältström");
    }

    #[test]
    fn test_decode_header_lenient_space() {
        assert_eq!(
            decode_header("=?UTF-8?Q?Test Subject?=").unwrap(),
            "Test Subject"
        );
    }

    #[test]
    fn test_decode_header_base64_and_adjacent_words() {
        assert_eq!(decode_header("=?UTF-8?B?SGVsbG8=?=").unwrap(), "Hello");
        assert_eq!(
            decode_header("=?utf-8?q?Hello,?= \r\n =?utf-8?q?_World?=").unwrap(),
            "Hello, World"
        );
    }

    #[test]
    fn test_decode_header_plain_and_malformed() {
        assert_eq!(decode_header("No encoding").unwrap(), "No encoding");
        assert_eq!(decode_header("a =? b").unwrap(), "a =? b");
    }

    #[test]
    fn test_decode_header_unknown_charset() {
        let err = decode_header("=?x-klingon?q?abc?=").unwrap_err();
        assert!(matches!(err, Error::Decode { charset } if charset == "x-klingon"));
    }

    #[test]
    fn test_decode_text_body() {
        let body = decode_text_body(Some("iso-8859-1"), vec![b'c', 0xE9]).unwrap();
        assert_eq!(body, "cé".as_bytes());

        let unchanged = decode_text_body(Some("UTF-8"), b"plain".to_vec()).unwrap();
        assert_eq!(unchanged, b"plain");

        let unchanged = decode_text_body(None, vec![0xff]).unwrap();
        assert_eq!(unchanged, vec![0xff]);

        assert!(matches!(
            decode_text_body(Some("x-unknown"), b"a".to_vec()).unwrap_err(),
            Error::Decode { .. }
        ));
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(
            "Quoted-Printable".parse::<TransferEncoding>().unwrap(),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            " base64 ".parse::<TransferEncoding>().unwrap(),
            TransferEncoding::Base64
        );
        assert_eq!(
            "7bit".parse::<TransferEncoding>().unwrap(),
            TransferEncoding::SevenBit
        );
        assert!("x-uuencode".parse::<TransferEncoding>().is_err());
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    proptest! {
        #[test]
        fn quoted_printable_lines_stay_short(input in prop::collection::vec(any::<u8>(), 0..400)) {
            let encoded = encode_quoted_printable(&input);
            for line in encoded.split(|&b| b == b'\n') {
                prop_assert!(line.len() <= MAX_LINE_LENGTH + 1);
            }
        }

        #[test]
        fn quoted_printable_restores_single_lines(
            input in prop::collection::vec(any::<u8>().prop_filter("no line breaks", |b| *b != b'\n' && *b != b'\r'), 0..400)
        ) {
            let encoded = encode_quoted_printable(&input);
            let decoded = decode_quoted_printable(&encoded).unwrap();
            prop_assert_eq!(decoded, input);
        }

        #[test]
        fn quoted_printable_restores_line_feeds_as_crlf(
            input in prop::collection::vec(prop::sample::select(vec![b'a', b'=', b' ', b'\t', b'\n', 0xc3, 0xa9]), 0..400)
        ) {
            let encoded = encode_quoted_printable(&input);
            let decoded = decode_quoted_printable(&encoded).unwrap();
            let mut expected = Vec::with_capacity(input.len() * 2);
            for &byte in &input {
                if byte == b'\n' {
                    expected.push(b'\r');
                }
                expected.push(byte);
            }
            prop_assert_eq!(decoded, expected);
        }
    }
}
