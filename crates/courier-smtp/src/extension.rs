//! Service extensions advertised in the EHLO reply.

/// SASL mechanisms the client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `PLAIN` (RFC 4616), sent as an initial response.
    Plain,
    /// `LOGIN`, username and password answered one challenge at a time.
    Login,
}

impl AuthMechanism {
    /// Parses a mechanism name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PLAIN") {
            Some(Self::Plain)
        } else if name.eq_ignore_ascii_case("LOGIN") {
            Some(Self::Login)
        } else {
            None
        }
    }

    /// Returns the mechanism name as sent in `AUTH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

/// One EHLO keyword line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS`
    StartTls,
    /// `AUTH` with the mechanisms this client understands.
    Auth(Vec<AuthMechanism>),
    /// `SIZE`, with the limit when the server states one.
    Size(Option<usize>),
    /// `8BITMIME`
    EightBitMime,
    /// `PIPELINING`
    Pipelining,
    /// `SMTPUTF8`
    SmtpUtf8,
    /// Any other keyword, upper-cased.
    Other(String),
}

impl Extension {
    /// Parses one line of the EHLO reply (greeting line excluded).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_uppercase();
        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            // Some servers still announce `AUTH=LOGIN PLAIN`.
            "AUTH" => Self::Auth(words.filter_map(AuthMechanism::parse).collect()),
            _ if keyword.starts_with("AUTH=") => Self::Auth(
                std::iter::once(&keyword["AUTH=".len()..])
                    .chain(words)
                    .filter_map(AuthMechanism::parse)
                    .collect(),
            ),
            "SIZE" => Self::Size(words.next().and_then(|size| size.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Other(keyword),
        }
    }
}
