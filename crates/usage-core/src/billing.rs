//! The billing seam: where finished usage reports go.

use std::error::Error as StdError;

use thiserror::Error;

use crate::report::UsageReport;

/// Errors returned by a [`BillingController`].
#[derive(Debug, Error)]
pub enum BillingError {
    /// The billing backend refused the report.
    #[error("billing rejected usage report: {message}")]
    Rejected { message: String },
    /// The report could not be delivered.
    #[error("billing transport failed: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

impl BillingError {
    pub fn transport(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Transport(err.into())
    }
}

/// Consumes a usage report downstream (invoicing, metering export, ...).
pub trait BillingController {
    fn reconcile(&self, report: &UsageReport) -> Result<(), BillingError>;
}

impl<T: BillingController + ?Sized> BillingController for &T {
    fn reconcile(&self, report: &UsageReport) -> Result<(), BillingError> {
        (**self).reconcile(report)
    }
}

impl<T: BillingController + ?Sized> BillingController for Box<T> {
    fn reconcile(&self, report: &UsageReport) -> Result<(), BillingError> {
        (**self).reconcile(report)
    }
}

/// Billing disabled: accepts every report and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBillingController;

impl BillingController for NoOpBillingController {
    fn reconcile(&self, report: &UsageReport) -> Result<(), BillingError> {
        tracing::debug!(records = report.len(), "billing disabled, dropping usage report");
        Ok(())
    }
}
