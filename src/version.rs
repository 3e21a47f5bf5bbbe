//! Semantic version parsing and ordering.
//!
//! Versions have the form `major.minor.patch[-extra]`. Ordering compares the
//! numeric triple first; for equal triples a version without `extra` sorts
//! *below* any version carrying one, and two extras compare lexicographically.
//! This is deliberately not semver precedence: `1.0.0 < 1.0.0-beta`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while building or parsing a [`SemanticVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version string '{0}'")]
    Malformed(String),

    #[error("Invalid {field} component in '{input}'")]
    InvalidNumber { field: &'static str, input: String },

    #[error("Empty extra component")]
    EmptyExtra,
}

/// A parsed `major.minor.patch[-extra]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    extra: Option<String>,
}

impl SemanticVersion {
    /// Build a version from its parts. `extra`, when present, must be non-empty.
    pub fn new(
        major: u32,
        minor: u32,
        patch: u32,
        extra: Option<String>,
    ) -> Result<Self, VersionError> {
        if matches!(extra.as_deref(), Some("")) {
            return Err(VersionError::EmptyExtra);
        }

        Ok(Self {
            major,
            minor,
            patch,
            extra,
        })
    }

    pub const fn release(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            extra: None,
        }
    }

    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    /// Whether `self` lies in the half-open range `[min, max)`.
    pub fn is_within(&self, min: &SemanticVersion, max: &SemanticVersion) -> bool {
        self >= min && self < max
    }
}

fn parse_component(field: &'static str, token: &str, input: &str) -> Result<u32, VersionError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::InvalidNumber {
            field,
            input: input.to_string(),
        });
    }

    token.parse().map_err(|_| VersionError::InvalidNumber {
        field,
        input: input.to_string(),
    })
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    /// Parse `major[.minor[.patch[-extra]]]`; missing components default to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionError::Malformed(s.to_string()));
        }

        let mut tokens = input.splitn(3, '.');
        let major = parse_component("major", tokens.next().unwrap_or_default(), input)?;
        let minor = match tokens.next() {
            Some(token) => parse_component("minor", token, input)?,
            None => 0,
        };

        let (patch, extra) = match tokens.next() {
            Some(rest) => {
                let (patch, extra) = match rest.split_once('-') {
                    Some((patch, extra)) => (patch, Some(extra.to_string())),
                    None => (rest, None),
                };
                (parse_component("patch", patch, input)?, extra)
            }
            None => (0, None),
        };

        Self::new(major, minor, patch, extra)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(extra) = &self.extra {
            write!(f, "-{extra}")?;
        }
        Ok(())
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.extra, &other.extra) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
