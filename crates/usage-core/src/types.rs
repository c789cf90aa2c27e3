//! Validated identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated workspace identifier.
    ///
    /// Workspace IDs are opaque, human-readable slugs (e.g. `gitpodio-gitpod-abc123`)
    /// shared by every instance started from the same workspace.
    WorkspaceId, "workspace ID"
);

define_string_id!(
    /// A validated billing account identifier.
    ///
    /// This is the payload of an attribution ID: the raw team or user identifier
    /// without its kind prefix.
    AccountId, "account ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_id_rejects_empty() {
        assert!(WorkspaceId::new("").is_err());
        assert!(WorkspaceId::new("   ").is_err());
        assert!(WorkspaceId::new("gitpodio-gitpod-abc123").is_ok());
    }

    #[test]
    fn account_id_rejects_empty() {
        let err = AccountId::new("").unwrap_err();
        assert_eq!(err.to_string(), "account ID cannot be empty");
    }

    #[test]
    fn workspace_id_serializes_as_plain_string() {
        let id = WorkspaceId::new("ws-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ws-1\"");
        let parsed: WorkspaceId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn workspace_id_deserialize_rejects_empty() {
        let result: Result<WorkspaceId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn account_ids_order_lexicographically() {
        let a = AccountId::new("alpha").unwrap();
        let b = AccountId::new("beta").unwrap();
        assert!(a < b);
    }
}
