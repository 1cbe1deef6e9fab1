use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when constructing a `UserId`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserIdError {
    #[error("user id cannot be empty")]
    Empty,
}

/// Opaque identifier for the person walking the marathon.
///
/// Always supplied by the host environment (or the demo fallback); the core
/// never invents one.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Creates a new `UserId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `UserIdError::Empty` if nothing is left after trimming.
    pub fn new(raw: impl Into<String>) -> Result<Self, UserIdError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UserIdError::Empty);
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_blank_input() {
        assert_eq!(UserId::new(""), Err(UserIdError::Empty));
        assert_eq!(UserId::new("   "), Err(UserIdError::Empty));
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::new("  4242 ").unwrap();
        assert_eq!(id.as_str(), "4242");
        assert_eq!(id.to_string(), "4242");
    }

    #[test]
    fn user_id_from_str() {
        let id: UserId = "demo_user".parse().unwrap();
        assert_eq!(id, UserId::new("demo_user").unwrap());
    }

    #[test]
    fn user_id_serde_rejects_empty_string() {
        let parsed: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let ok: UserId = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(ok.as_str(), "123");
    }
}
