//! Workspace instance records as read from storage.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribution::AttributionId;
use crate::types::WorkspaceId;
use crate::workspace_type::WorkspaceType;

/// One workspace runtime instance.
///
/// Records come straight from storage and may be incomplete: a missing
/// `creation_time` makes the runtime undefined, so such records are never
/// billed. Use [`BillableInstance::try_from`] to separate the two cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub owner_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Pricing tier. Empty means the default class.
    #[serde(default)]
    pub workspace_class: String,
    #[serde(default, rename = "type")]
    pub workspace_type: WorkspaceType,
    #[serde(rename = "usage_attribution_id")]
    pub attribution_id: AttributionId,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_time: Option<DateTime<Utc>>,
    /// `None` while the instance is running or if it never stopped cleanly.
    #[serde(default)]
    pub stopped_time: Option<DateTime<Utc>>,
}

/// Why an instance record cannot be billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    MissingCreationTime,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCreationTime => write!(f, "missing creation time"),
        }
    }
}

/// An instance record that was rejected for billing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInstance {
    pub record: InstanceRecord,
    pub reason: InvalidReason,
}

/// An instance record known to carry a creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillableInstance {
    record: InstanceRecord,
    creation_time: DateTime<Utc>,
}

impl BillableInstance {
    pub const fn record(&self) -> &InstanceRecord {
        &self.record
    }

    pub const fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// Runtime accrued between creation and `cutoff`.
    ///
    /// Stopped instances accrue until `min(stopped_time, cutoff)`; running
    /// instances accrue until `cutoff`. Never negative.
    pub fn billable_runtime(&self, cutoff: DateTime<Utc>) -> Duration {
        let effective_stop = self
            .record
            .stopped_time
            .map_or(cutoff, |stopped| stopped.min(cutoff));
        (effective_stop - self.creation_time).max(Duration::zero())
    }
}

impl TryFrom<InstanceRecord> for BillableInstance {
    type Error = InvalidInstance;

    fn try_from(record: InstanceRecord) -> Result<Self, Self::Error> {
        match record.creation_time {
            Some(creation_time) => Ok(Self {
                record,
                creation_time,
            }),
            None => Err(InvalidInstance {
                record,
                reason: InvalidReason::MissingCreationTime,
            }),
        }
    }
}

/// Splits records into billable and invalid instances, preserving order.
pub fn partition_instances(
    records: Vec<InstanceRecord>,
) -> (Vec<BillableInstance>, Vec<InvalidInstance>) {
    let mut billable = Vec::with_capacity(records.len());
    let mut invalid = Vec::new();
    for record in records {
        match BillableInstance::try_from(record) {
            Ok(instance) => billable.push(instance),
            Err(rejected) => invalid.push(rejected),
        }
    }
    (billable, invalid)
}
