use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("first name cannot be empty")]
    EmptyFirstName,
}

/// Registration details supplied by the host environment.
///
/// Only the first name is required; blank optional fields are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProfileFields")]
pub struct UserProfile {
    first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl UserProfile {
    /// Builds a profile.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::EmptyFirstName` if `first_name` is blank.
    pub fn new(
        first_name: impl Into<String>,
        last_name: Option<String>,
        username: Option<String>,
    ) -> Result<Self, ProfileError> {
        let first_name = first_name.into().trim().to_owned();
        if first_name.is_empty() {
            return Err(ProfileError::EmptyFirstName);
        }
        Ok(Self {
            first_name,
            last_name: non_blank(last_name),
            username: non_blank(username),
        })
    }

    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    #[must_use]
    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// Unvalidated wire shape; decoding goes through [`UserProfile::new`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFields {
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TryFrom<ProfileFields> for UserProfile {
    type Error = ProfileError;

    fn try_from(fields: ProfileFields) -> Result<Self, Self::Error> {
        Self::new(fields.first_name, fields.last_name, fields.username)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optional_fields_are_dropped() {
        let profile = UserProfile::new("Anna", Some("  ".into()), Some("anna_k".into())).unwrap();
        assert_eq!(profile.first_name(), "Anna");
        assert_eq!(profile.last_name(), None);
        assert_eq!(profile.username(), Some("anna_k"));
    }

    #[test]
    fn serializes_with_camel_case_and_skips_missing() {
        let profile = UserProfile::new("Anna", None, None).unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json, serde_json::json!({ "firstName": "Anna" }));
    }

    #[test]
    fn decoding_applies_the_same_validation() {
        let blank: Result<UserProfile, _> = serde_json::from_str(r#"{"firstName":"  "}"#);
        assert!(blank.is_err());

        let decoded: UserProfile =
            serde_json::from_str(r#"{"firstName":" Anna ","username":" "}"#).unwrap();
        assert_eq!(decoded, UserProfile::new("Anna", None, None).unwrap());
    }

    #[test]
    fn requires_first_name() {
        assert_eq!(
            UserProfile::new(" ", None, None),
            Err(ProfileError::EmptyFirstName)
        );
    }
}
