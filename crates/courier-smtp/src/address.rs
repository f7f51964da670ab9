//! Envelope addresses.

use crate::error::{Error, Result};
use std::fmt;

/// A reverse-path or forward-path as it appears between `<` and `>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates an envelope address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is empty, lacks a
    /// local part or domain, or contains characters that would break the
    /// command line (whitespace, angle brackets, control characters).
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!(
                "unexpected character in {address:?}"
            )));
        }
        match address.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self(address)),
            _ => Err(Error::InvalidAddress(format!(
                "expected local@domain, got {address:?}"
            ))),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the address needs the `SMTPUTF8` extension.
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.0.is_ascii()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
