//! SMTP commands.

use crate::address::Address;
use crate::extension::AuthMechanism;

/// A command line sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO`
    Ehlo {
        /// Name the client announces itself with.
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH`
    Auth {
        /// SASL mechanism.
        mechanism: AuthMechanism,
        /// Base64 initial response, if any.
        initial_response: Option<String>,
    },
    /// A base64 line answering a `334` challenge.
    AuthResponse(String),
    /// `MAIL FROM`
    MailFrom {
        /// Reverse-path.
        from: Address,
        /// `SIZE=` parameter.
        size: Option<usize>,
        /// Adds `SMTPUTF8` for non-ASCII paths.
        utf8: bool,
    },
    /// `RCPT TO`
    RcptTo {
        /// Forward-path.
        to: Address,
    },
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `NOOP`
    Noop,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Serializes the command, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(response),
            } => format!("AUTH {} {response}", mechanism.as_str()),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from, size, utf8 } => {
                let mut line = format!("MAIL FROM:<{from}>");
                if let Some(size) = size {
                    line.push_str(&format!(" SIZE={size}"));
                }
                if *utf8 {
                    line.push_str(" SMTPUTF8");
                }
                line
            }
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Verb used in logs; credentials never leave this type unredacted.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH-RESPONSE",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address(raw: &str) -> Address {
        Address::new(raw).unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            Command::Ehlo {
                hostname: "client.example.com".into()
            }
            .serialize(),
            b"EHLO client.example.com\r\n"
        );
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_auth_commands() {
        let plain = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".into()),
        };
        assert_eq!(plain.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");

        let login = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(login.serialize(), b"AUTH LOGIN\r\n");
        assert_eq!(Command::AuthResponse("dXNlcg==".into()).serialize(), b"dXNlcg==\r\n");
    }

    #[test]
    fn test_envelope_commands() {
        let mail = Command::MailFrom {
            from: address("sender@example.com"),
            size: None,
            utf8: false,
        };
        assert_eq!(mail.serialize(), b"MAIL FROM:<sender@example.com>\r\n");

        let mail = Command::MailFrom {
            from: address("josé@example.com"),
            size: Some(1024),
            utf8: true,
        };
        assert_eq!(
            mail.serialize(),
            "MAIL FROM:<josé@example.com> SIZE=1024 SMTPUTF8\r\n".as_bytes()
        );

        let rcpt = Command::RcptTo {
            to: address("rcpt@example.com"),
        };
        assert_eq!(rcpt.serialize(), b"RCPT TO:<rcpt@example.com>\r\n");
    }

    #[test]
    fn test_verb_hides_credentials() {
        let auth = Command::AuthResponse("c2VjcmV0".into());
        assert_eq!(auth.verb(), "AUTH-RESPONSE");
    }
}
