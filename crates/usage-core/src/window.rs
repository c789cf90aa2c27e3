//! The half-open reconciliation window.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::instance::InstanceRecord;

/// The window end was not after its start.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("reconciliation window end {end} must be after start {start}")]
pub struct InvalidWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The interval `[start, end)` a reconciliation run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReconcileWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidWindow> {
        if end <= start {
            return Err(InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether an instance was alive at some point within the window.
    ///
    /// An instance overlaps if it was created before `end` and is either still
    /// running or stopped strictly after `start`. Records without a creation
    /// time are kept so the caller can count them as invalid.
    pub fn overlaps(&self, record: &InstanceRecord) -> bool {
        let created_before_end = record
            .creation_time
            .is_none_or(|created| created < self.end);
        let stopped_after_start = record
            .stopped_time
            .is_none_or(|stopped| stopped > self.start);
        created_before_end && stopped_after_start
    }

    /// Where credit accrual stops for a run observed at `now`.
    ///
    /// Historical windows stop at their end; a window still in progress stops
    /// at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end.min(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::instance;
    use chrono::TimeZone;

    fn may() -> ReconcileWindow {
        ReconcileWindow::new(
            Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_windows() {
        let t = Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap();
        assert!(ReconcileWindow::new(t, t).is_err());
        let err = ReconcileWindow::new(t, t - chrono::Duration::hours(1)).unwrap_err();
        assert_eq!(err.start, t);
    }

    #[test]
    fn stopped_exactly_at_start_is_excluded() {
        let window = may();
        let record = instance(
            Some(window.start() - chrono::Duration::hours(2)),
            Some(window.start()),
        );
        assert!(!window.overlaps(&record));
    }

    #[test]
    fn created_exactly_at_end_is_excluded() {
        let window = may();
        assert!(!window.overlaps(&instance(Some(window.end()), None)));
    }

    #[test]
    fn running_instance_created_before_end_overlaps() {
        let window = may();
        let record = instance(Some(window.start() - chrono::Duration::days(3)), None);
        assert!(window.overlaps(&record));
    }

    #[test]
    fn instance_spanning_the_whole_window_overlaps() {
        let window = may();
        let record = instance(
            Some(window.start() - chrono::Duration::days(1)),
            Some(window.end() + chrono::Duration::days(1)),
        );
        assert!(window.overlaps(&record));
    }

    #[test]
    fn records_without_creation_time_are_kept() {
        let window = may();
        assert!(window.overlaps(&instance(None, Some(window.end()))));
        assert!(!window.overlaps(&instance(None, Some(window.start()))));
    }

    #[test]
    fn cutoff_is_the_earlier_of_end_and_now() {
        let window = may();
        let before_end = Utc.with_ymd_and_hms(2022, 5, 31, 23, 0, 0).unwrap();
        assert_eq!(window.cutoff(before_end), before_end);
        let after_end = Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(window.cutoff(after_end), window.end());
    }
}
