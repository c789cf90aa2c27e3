//! The storage seam: where instance records come from.

use std::error::Error as StdError;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::instance::InstanceRecord;
use crate::window::ReconcileWindow;

/// Errors returned by an [`InstanceSource`].
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query observed cancellation before it completed.
    #[error("instance query was cancelled")]
    Cancelled,
    /// The backing store failed.
    #[error("instance query failed: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl QueryError {
    pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// Reads workspace instance records.
///
/// Implementations must return every record overlapping the window as defined
/// by [`ReconcileWindow::overlaps`]; the reconciler does not re-filter. A
/// cancelled token must abort the read with [`QueryError::Cancelled`] rather
/// than return partial results.
pub trait InstanceSource {
    fn list_instances_overlapping(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceRecord>, QueryError>;
}

impl<T: InstanceSource + ?Sized> InstanceSource for &T {
    fn list_instances_overlapping(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceRecord>, QueryError> {
        (**self).list_instances_overlapping(window, cancel)
    }
}

/// An [`InstanceSource`] over records held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstances {
    records: Vec<InstanceRecord>,
}

impl InMemoryInstances {
    pub const fn new(records: Vec<InstanceRecord>) -> Self {
        Self { records }
    }
}

impl InstanceSource for InMemoryInstances {
    fn list_instances_overlapping(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceRecord>, QueryError> {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        Ok(self
            .records
            .iter()
            .filter(|record| window.overlaps(record))
            .cloned()
            .collect())
    }
}
