//! Session credential handling.

use crate::error::{PulseError, Result};
use std::fmt;

/// Minimum accepted credential length.
pub const MIN_CREDENTIAL_LEN: usize = 30;

/// Name of the session cookie the credential is sent as.
pub const CREDENTIAL_COOKIE_NAME: &str = ".ROBLOSECURITY";

/// A validated `.ROBLOSECURITY` session token.
///
/// Construction is the only validation point: a `Credential` value always
/// satisfies the length and prefix rules, so code holding one never needs to
/// re-check it. The token is never printed through `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validates and wraps a raw token.
    ///
    /// # Errors
    ///
    /// Returns `PulseError::InvalidCredential` if the token is empty, shorter
    /// than [`MIN_CREDENTIAL_LEN`], or starts with `cookie` (a pasted header
    /// name instead of its value).
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Self(raw))
    }

    /// Returns the raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the `cookie` header value carrying this credential.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", CREDENTIAL_COOKIE_NAME, self.0)
    }

    /// Returns the last `n` characters of the token, or the whole token if it
    /// is shorter. Used to derive stable fallback session ids.
    pub fn tail(&self, n: usize) -> &str {
        let count = self.0.chars().count();
        if count <= n {
            return &self.0;
        }
        let skip = count - n;
        let start = self
            .0
            .char_indices()
            .nth(skip)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.chars().count())
    }
}

/// Checks the shape of a raw credential without wrapping it.
pub fn validate(raw: &str) -> Result<()> {
    if raw.is_empty() || raw.chars().count() < MIN_CREDENTIAL_LEN || raw.starts_with("cookie") {
        return Err(PulseError::invalid_credential(
            "ROBLOSECURITY cookie is not properly configured. It should be the full cookie value.",
        ));
    }
    Ok(())
}
