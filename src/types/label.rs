// ABOUTME: DNS-label style names used for logical resource names and stage ids.
// ABOUTME: Both follow RFC 1123 label rules so they can be embedded in tags and keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{0} exceeds maximum length of 63 characters")]
    TooLong(&'static str),

    #[error("{0} cannot start or end with a hyphen")]
    EdgeHyphen(&'static str),

    #[error("{0} must be lowercase")]
    NotLowercase(&'static str),

    #[error("invalid character in {what}: '{ch}'")]
    InvalidChar { what: &'static str, ch: char },
}

fn validate(value: &str, what: &'static str) -> Result<(), LabelError> {
    if value.is_empty() {
        return Err(LabelError::Empty(what));
    }
    if value.len() > 63 {
        return Err(LabelError::TooLong(what));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(LabelError::EdgeHyphen(what));
    }
    for ch in value.chars() {
        if ch.is_ascii_uppercase() {
            return Err(LabelError::NotLowercase(what));
        }
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(LabelError::InvalidChar { what, ch });
        }
    }
    Ok(())
}

macro_rules! label_type {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: &str) -> Result<Self, LabelError> {
                validate(value, $what)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = LabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::new(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

label_type!(
    /// Logical name of a managed resource, stable across re-provisioning.
    LogicalName,
    "logical name"
);

label_type!(
    /// Identifier of a pipeline stage.
    StageId,
    "stage id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_with_hyphens() {
        assert!(StageId::new("build-frontend").is_ok());
        assert!(LogicalName::new("my-app2").is_ok());
    }

    #[test]
    fn reports_which_kind_of_name_failed() {
        let err = StageId::new("Build").unwrap_err();
        assert_eq!(err, LabelError::NotLowercase("stage id"));
        assert_eq!(err.to_string(), "stage id must be lowercase");
    }

    #[test]
    fn rejects_edge_hyphen() {
        assert_eq!(
            LogicalName::new("-app").unwrap_err(),
            LabelError::EdgeHyphen("logical name")
        );
    }
}
