//! Stable identifiers for definitions and runtimes

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a definition, unique within one project.
///
/// Projects authored by hand may use any non-empty string, so the value is
/// kept as text rather than parsed into a canonical UUID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uuid(String);

impl Uuid {
    /// Wrap an existing identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random identifier
    pub fn random() -> Self {
        Self(::uuid::Uuid::new_v4().simple().to_string())
    }

    /// The empty identifier, used for unassigned references
    pub fn nil() -> Self {
        Self(String::new())
    }

    /// Whether this identifier can name a definition
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uuid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Uuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for Uuid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Uuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_uuids_are_distinct_and_valid() {
        let a = Uuid::random();
        let b = Uuid::random();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_blank_uuid_is_invalid() {
        assert!(!Uuid::nil().is_valid());
        assert!(!Uuid::new("   ").is_valid());
        assert!(Uuid::from("tex-1").is_valid());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let uuid = Uuid::new("abc");
        assert_eq!(serde_json::to_string(&uuid).unwrap(), "\"abc\"");
        let parsed: Uuid = serde_json::from_str("\"xyz\"").unwrap();
        assert_eq!(parsed, Uuid::new("xyz"));
    }
}
