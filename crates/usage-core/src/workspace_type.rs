//! Workspace type enum as the single source of truth for workspace type strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of workload a workspace instance ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkspaceType {
    #[default]
    Regular,
    Prebuild,
    Probe,
    ImageBuild,
}

impl WorkspaceType {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Prebuild => "prebuild",
            Self::Probe => "probe",
            Self::ImageBuild => "imagebuild",
        }
    }
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkspaceType {
    type Err = UnknownWorkspaceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "prebuild" => Ok(Self::Prebuild),
            "probe" => Ok(Self::Probe),
            "imagebuild" => Ok(Self::ImageBuild),
            _ => Err(UnknownWorkspaceType(s.to_string())),
        }
    }
}

impl Serialize for WorkspaceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkspaceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown workspace type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWorkspaceType(String);

impl fmt::Display for UnknownWorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown workspace type: {}", self.0)
    }
}

impl std::error::Error for UnknownWorkspaceType {}
