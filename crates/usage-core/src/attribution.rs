//! Attribution IDs: who pays for a workspace instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, ValidationError};

const TEAM_PREFIX: &str = "team";
const USER_PREFIX: &str = "user";

/// The billing owner of a workspace instance.
///
/// Serialized as `<kind>:<id>`, e.g. `team:0e3a...` or `user:9f1c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributionId {
    /// Usage is billed to a team.
    Team(AccountId),
    /// Usage is billed to an individual user.
    User(AccountId),
}

impl AttributionId {
    /// Attributes usage to the given team.
    pub fn team(id: impl Into<String>) -> Result<Self, ValidationError> {
        AccountId::new(id).map(Self::Team)
    }

    /// Attributes usage to the given user.
    pub fn user(id: impl Into<String>) -> Result<Self, ValidationError> {
        AccountId::new(id).map(Self::User)
    }

    /// Returns the team identifier if this is a team attribution.
    pub const fn team_id(&self) -> Option<&AccountId> {
        match self {
            Self::Team(id) => Some(id),
            Self::User(_) => None,
        }
    }

    /// Returns the raw account identifier, regardless of kind.
    pub const fn account_id(&self) -> &AccountId {
        match self {
            Self::Team(id) | Self::User(id) => id,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Team(_) => TEAM_PREFIX,
            Self::User(_) => USER_PREFIX,
        }
    }
}

impl fmt::Display for AttributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.account_id())
    }
}

/// Error returned when an attribution ID string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseAttributionError {
    /// The value did not contain a `<kind>:<id>` separator.
    #[error("attribution ID is missing a kind prefix: {0}")]
    MissingKind(String),
    /// The kind prefix was not `team` or `user`.
    #[error("unknown attribution kind: {0}")]
    UnknownKind(String),
    /// The identifier after the prefix was empty.
    #[error(transparent)]
    InvalidId(#[from] ValidationError),
}

impl FromStr for AttributionId {
    type Err = ParseAttributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, id)) = s.split_once(':') else {
            return Err(ParseAttributionError::MissingKind(s.to_string()));
        };
        match kind {
            TEAM_PREFIX => Ok(Self::team(id)?),
            USER_PREFIX => Ok(Self::user(id)?),
            _ => Err(ParseAttributionError::UnknownKind(kind.to_string())),
        }
    }
}

impl Serialize for AttributionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AttributionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
