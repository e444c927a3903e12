//! Window and session identifiers.
//!
//! A [`WindowId`] names one browser window/tab within a session. Ids are
//! generated server side and travel through URLs, form fields and script
//! snippets, so ids read back from a client are validated before use: only
//! `[A-Za-z0-9_-]`, at most [`MAX_WINDOW_ID_LEN`] characters.

use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of generated window ids.
pub const GENERATED_WINDOW_ID_LEN: usize = 16;

/// Longest window id accepted from a client.
pub const MAX_WINDOW_ID_LEN: usize = 64;

/// Opaque token identifying a client window within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_WINDOW_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Validate an id received from a client. Returns `None` when the value
    /// is empty, too long, or contains characters outside `[A-Za-z0-9_-]`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_WINDOW_ID_LEN {
            return None;
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WindowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a container session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
