//! Signal path parsing.
//!
//! Signal paths are dot-separated strings like "Vehicle.Engine.RPM".
//! Every path entering the store is parsed into a [`SignalPath`] first,
//! so the store itself never sees a malformed key.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn path_regex() -> &'static Regex {
    static PATH_RE: OnceLock<Regex> = OnceLock::new();
    PATH_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$").expect("path regex is valid")
    })
}

/// A parsed signal path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignalPath {
    raw: String,
}

impl SignalPath {
    /// Parse and validate a path string.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if !path_regex().is_match(path) {
            return Err(PathError::Invalid(path.to_string()));
        }
        Ok(Self {
            raw: path.to_string(),
        })
    }

    /// Get the raw path string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Get the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('.')
    }
}

impl std::fmt::Display for SignalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for SignalPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalPath::parse(s)
    }
}

impl TryFrom<String> for SignalPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        SignalPath::parse(&s)
    }
}

impl From<SignalPath> for String {
    fn from(path: SignalPath) -> Self {
        path.raw
    }
}

impl AsRef<str> for SignalPath {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Errors that can occur when parsing a signal path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("Empty path")]
    Empty,

    #[error("Invalid path '{0}': expected dot-separated segments of [A-Za-z0-9_]")]
    Invalid(String),
}
