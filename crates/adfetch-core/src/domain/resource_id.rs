use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Opaque platform object id.
///
/// Ids are used verbatim in request paths, so only URL-safe characters are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyResourceId);
        }

        for (index, ch) in trimmed.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == ':';
            if !valid {
                return Err(ValidationError::ResourceIdInvalidChar { ch, index });
            }
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_trims_id() {
        let parsed = ResourceId::parse(" 23851234 ").expect("id should parse");
        assert_eq!(parsed.as_str(), "23851234");
        assert!(ResourceId::parse("act_1001").is_ok());
    }

    #[test]
    fn rejects_empty_id() {
        let err = ResourceId::parse("   ").expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyResourceId);
    }

    #[test]
    fn rejects_path_characters() {
        let err = ResourceId::parse("123/insights").expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::ResourceIdInvalidChar { ch: '/', index: 3 }
        ));
    }
}
