//! Core domain logic for workspace usage reconciliation.
//!
//! This crate contains the fundamental types and logic for:
//! - Pricing: credits per hour for each workspace class
//! - Conversion: turning workspace instances into usage records
//! - Reporting: per-team credit summaries
//! - Reconciliation: loading, validating, converting and dispatching usage

mod attribution;
mod billing;
mod clock;
mod instance;
mod pricing;
mod reconciler;
mod report;
mod source;
pub mod types;
mod usage;
mod window;
pub mod workspace_type;

pub use attribution::{AttributionId, ParseAttributionError};
pub use billing::{BillingController, BillingError, NoOpBillingController};
pub use clock::{Clock, FixedClock, SystemClock};
pub use instance::{
    BillableInstance, InstanceRecord, InvalidInstance, InvalidReason, partition_instances,
};
pub use pricing::{DEFAULT_CREDITS_PER_HOUR, DEFAULT_WORKSPACE_CLASS, PricingError, WorkspacePricer};
pub use reconciler::{ReconcileError, ReconcileOutcome, ReconcileStatus, UsageReconciler};
pub use report::UsageReport;
pub use source::{InMemoryInstances, InstanceSource, QueryError};
pub use types::{AccountId, ValidationError, WorkspaceId};
pub use usage::{UsageRecord, instances_to_usage_records};
pub use window::{InvalidWindow, ReconcileWindow};
pub use workspace_type::{UnknownWorkspaceType, WorkspaceType};
