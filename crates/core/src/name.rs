//! Qualified names
//!
//! A qualified name is a hierarchical, dot-separated identifier such as
//! `analytics.events`: the owning namespace followed by the entity's leaf
//! name. Qualified names are the lookup and ordering key of every catalog
//! repository.
//!
//! ## Validation
//!
//! Qualified names must:
//! - Be 1-512 bytes
//! - Consist of non-empty segments separated by `.`
//! - Contain only `[a-zA-Z0-9_-]` inside segments

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{StrataError, StrataResult};
use crate::ordering::{compare_qualified, SEGMENT_SEPARATOR};

/// Maximum length of a qualified name in bytes
pub const MAX_QUALIFIED_NAME_LENGTH: usize = 512;

/// Validated hierarchical name
///
/// Ordered segment-wise, consistent with
/// [`QualifiedNameOrder`](crate::ordering::QualifiedNameOrder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Parse and validate a qualified name
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidInput` if the name is malformed.
    pub fn parse(name: impl Into<String>) -> StrataResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(QualifiedName(name))
    }

    /// Validate a qualified name without taking ownership
    pub fn validate(name: &str) -> StrataResult<()> {
        if name.is_empty() {
            return Err(StrataError::invalid_input("qualified name cannot be empty"));
        }
        if name.len() > MAX_QUALIFIED_NAME_LENGTH {
            return Err(StrataError::invalid_input(format!(
                "qualified name too long: {} bytes (max {})",
                name.len(),
                MAX_QUALIFIED_NAME_LENGTH
            )));
        }
        for (index, segment) in name.split('.').enumerate() {
            if segment.is_empty() {
                return Err(StrataError::invalid_input(format!(
                    "qualified name '{}' has an empty segment at position {}",
                    name, index
                )));
            }
            if let Some(bad) = segment.chars().find(|c| !Self::is_valid_char(*c)) {
                return Err(StrataError::invalid_input(format!(
                    "invalid character '{}' in qualified name '{}' (only alphanumeric, dash, underscore allowed)",
                    bad, name
                )));
            }
        }
        Ok(())
    }

    #[inline]
    fn is_valid_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }

    /// Get the name as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Iterate over the segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.0.bytes().filter(|b| *b == SEGMENT_SEPARATOR).count() + 1
    }

    /// The last segment
    pub fn leaf(&self) -> &str {
        match self.0.rfind('.') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// The name without its last segment, if any
    pub fn parent(&self) -> Option<QualifiedName> {
        self.0
            .rfind('.')
            .map(|pos| QualifiedName(self.0[..pos].to_string()))
    }

    /// Append a segment
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidInput` if the segment is malformed.
    pub fn child(&self, segment: &str) -> StrataResult<QualifiedName> {
        QualifiedName::parse(format!("{}.{}", self.0, segment))
    }

    /// Whether `self` is `other` or nested under it
    pub fn is_within(&self, other: &QualifiedName) -> bool {
        self.0 == other.0
            || (self.0.starts_with(other.as_str())
                && self.0.as_bytes().get(other.0.len()) == Some(&SEGMENT_SEPARATOR))
    }

    /// Prefix that matches every name nested under `self`
    pub fn nested_prefix(&self) -> String {
        format!("{}.", self.0)
    }
}

impl PartialOrd for QualifiedName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualifiedName {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_qualified(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        QualifiedName::parse(value)
    }
}

impl TryFrom<&str> for QualifiedName {
    type Error = StrataError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        QualifiedName::parse(value)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.0
    }
}
