//! Conversion of billable instances into usage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribution::AttributionId;
use crate::instance::BillableInstance;
use crate::pricing::{DEFAULT_WORKSPACE_CLASS, WorkspacePricer};
use crate::report::UsageReport;
use crate::types::WorkspaceId;
use crate::workspace_type::WorkspaceType;

/// Credits consumed by one workspace instance.
///
/// `stopped_at` is the instance's real stop time, even when it lies past the
/// cutoff the credits were computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub instance_id: Uuid,
    pub attribution_id: AttributionId,
    pub user_id: Uuid,
    pub workspace_id: WorkspaceId,
    /// Empty when the workspace has no project.
    #[serde(default)]
    pub project_id: String,
    pub workspace_type: WorkspaceType,
    pub workspace_class: String,
    pub credits_used: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Version counter owned by the storage layer's upsert.
    #[serde(default)]
    pub generation_id: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl UsageRecord {
    fn from_instance(
        instance: &BillableInstance,
        pricer: &WorkspacePricer,
        cutoff: DateTime<Utc>,
    ) -> Self {
        let record = instance.record();
        let workspace_class = if record.workspace_class.is_empty() {
            DEFAULT_WORKSPACE_CLASS.to_string()
        } else {
            record.workspace_class.clone()
        };
        let credits_used = pricer.credits(&workspace_class, instance.billable_runtime(cutoff));

        Self {
            instance_id: record.id,
            attribution_id: record.attribution_id.clone(),
            user_id: record.owner_id,
            workspace_id: record.workspace_id.clone(),
            project_id: record.project_id.clone().unwrap_or_default(),
            workspace_type: record.workspace_type,
            workspace_class,
            credits_used,
            started_at: instance.creation_time(),
            stopped_at: record.stopped_time,
            generation_id: 0,
            deleted: false,
        }
    }
}

/// Converts billable instances into usage records, one per instance, in order.
///
/// Credits accrue from each instance's creation time until the earlier of its
/// stop time and `cutoff`.
pub fn instances_to_usage_records(
    instances: &[BillableInstance],
    pricer: &WorkspacePricer,
    cutoff: DateTime<Utc>,
) -> UsageReport {
    instances
        .iter()
        .map(|instance| UsageRecord::from_instance(instance, pricer, cutoff))
        .collect()
}
