//! SMTP replies and their parser.
//!
//! Replies are one or more lines sharing a three-digit code:
//! - Single: `250 OK`
//! - Multi: `250-mail.example.com`, `250-PIPELINING`, `250 STARTTLS`

use crate::error::{Error, Result};
use std::fmt;

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Server challenge during AUTH
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 450 Mailbox unavailable (busy)
    pub const MAILBOX_BUSY: Self = Self(450);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 554 Transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);

    /// Creates a reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// 3xx
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// 4xx
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// 5xx
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code.
    pub code: ReplyCode,
    /// Text of each line, code and separator removed.
    pub lines: Vec<String>,
}

impl Reply {
    /// Returns true for a 2xx reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Joins all lines with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Converts the reply into an error unless its code satisfies `accept`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SmtpError`] carrying the code and text.
    pub fn ensure(self, accept: impl FnOnce(ReplyCode) -> bool) -> Result<Self> {
        if accept(self.code) {
            Ok(self)
        } else {
            Err(Error::smtp_error(self.code.as_u16(), self.text()))
        }
    }
}

/// Returns true if `line` ends a reply (`250 ...` rather than `250-...`).
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes() {
        [_, _, _] => true,
        [_, _, _, separator, ..] => *separator == b' ',
        _ => false,
    }
}

/// Parses the lines of one reply.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if there are no lines, a line lacks a numeric
/// code, or the lines disagree on the code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };
    let code = line_code(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if line_code(line)? != code {
            return Err(Error::Protocol(format!(
                "reply code changed mid-reply: {line}"
            )));
        }
        match line.as_bytes().get(3) {
            None => text.push(String::new()),
            Some(b' ' | b'-') => text.push(line[4..].to_string()),
            Some(_) => return Err(Error::Protocol(format!("malformed reply line: {line}"))),
        }
    }

    Ok(Reply {
        code: ReplyCode::new(code),
        lines: text,
    })
}

fn line_code(line: &str) -> Result<u16> {
    line.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid reply code: {line}")))
}
