//! Usage reconciliation over a time window.
//!
//! # Algorithm Summary
//!
//! 1. Load every instance overlapping `[start, end)` from the [`InstanceSource`]
//! 2. Split records into billable and invalid (no creation time)
//! 3. Convert billable instances into usage records, accruing credits up to
//!    `min(end, now)`
//! 4. Hand the report to the [`BillingController`] and return it with a status

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::billing::{BillingController, BillingError};
use crate::clock::Clock;
use crate::instance::partition_instances;
use crate::pricing::WorkspacePricer;
use crate::report::UsageReport;
use crate::source::{InstanceSource, QueryError};
use crate::usage::instances_to_usage_records;
use crate::window::{InvalidWindow, ReconcileWindow};

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileStatus {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Instances converted into usage records.
    pub workspace_instances: usize,
    /// Instances skipped because they could not be billed.
    pub invalid_workspace_instances: usize,
}

/// Everything a successful run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub status: ReconcileStatus,
    pub report: UsageReport,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The requested window is empty or inverted.
    #[error(transparent)]
    InvalidWindow(#[from] InvalidWindow),
    /// The run was cancelled before instances were loaded.
    #[error("usage reconciliation was cancelled")]
    Cancelled,
    /// Instances could not be loaded. No report was produced.
    #[error("failed to load workspace instances: {0}")]
    Query(#[source] QueryError),
    /// The report was computed but billing failed to accept it.
    #[error("failed to dispatch usage report to billing: {source}")]
    Billing {
        #[source]
        source: BillingError,
        /// The computed status and report, so callers can retry billing.
        outcome: Box<ReconcileOutcome>,
    },
}

impl ReconcileError {
    /// The computed outcome, if the run got far enough to produce one.
    pub fn outcome(&self) -> Option<&ReconcileOutcome> {
        match self {
            Self::Billing { outcome, .. } => Some(&**outcome),
            _ => None,
        }
    }
}

impl From<QueryError> for ReconcileError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Cancelled => Self::Cancelled,
            other => Self::Query(other),
        }
    }
}

/// Reconciles workspace usage against a storage source and a billing backend.
///
/// The reconciler holds no state between runs; concurrent runs over
/// overlapping windows rely on the storage layer's idempotent upsert.
#[derive(Debug)]
pub struct UsageReconciler<S, B, C> {
    source: S,
    billing: B,
    clock: C,
    pricer: WorkspacePricer,
}

impl<S, B, C> UsageReconciler<S, B, C>
where
    S: InstanceSource,
    B: BillingController,
    C: Clock,
{
    pub const fn new(source: S, billing: B, clock: C, pricer: WorkspacePricer) -> Self {
        Self {
            source,
            billing,
            clock,
            pricer,
        }
    }

    /// Reconciles usage for instances alive within `[start, end)`.
    pub fn reconcile_time_range(
        &self,
        cancel: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let window = ReconcileWindow::new(start, end)?;
        let now = self.clock.now();
        let cutoff = window.cutoff(now);
        tracing::info!(%start, %end, %now, %cutoff, "reconciling workspace usage");

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let records = self.source.list_instances_overlapping(&window, cancel)?;
        tracing::debug!(instance_count = records.len(), "loaded workspace instances");

        let (billable, invalid) = partition_instances(records);
        for rejected in &invalid {
            tracing::warn!(
                instance_id = %rejected.record.id,
                workspace_id = %rejected.record.workspace_id,
                reason = %rejected.reason,
                "skipping invalid workspace instance"
            );
        }

        let report = instances_to_usage_records(&billable, &self.pricer, cutoff);
        let status = ReconcileStatus {
            start_time: start,
            end_time: end,
            workspace_instances: billable.len(),
            invalid_workspace_instances: invalid.len(),
        };
        tracing::debug!(
            records = report.len(),
            total_credits = report.total_credits(),
            "computed usage report"
        );

        let outcome = ReconcileOutcome { status, report };
        if let Err(source) = self.billing.reconcile(&outcome.report) {
            tracing::error!(error = %source, "billing rejected usage report");
            return Err(ReconcileError::Billing {
                source,
                outcome: Box::new(outcome),
            });
        }

        tracing::info!(
            valid = status.workspace_instances,
            invalid = status.invalid_workspace_instances,
            "usage reconciliation finished"
        );
        Ok(outcome)
    }
}
