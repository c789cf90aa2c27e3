//! Usage reports and per-team credit summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::AccountId;
use crate::usage::UsageRecord;

/// The usage records produced by one reconciliation run, in query order.
///
/// Records are not deduplicated; storage owns upsert semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageReport {
    records: Vec<UsageRecord>,
}

impl UsageReport {
    pub const fn new(records: Vec<UsageRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<UsageRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UsageRecord> {
        self.records.iter()
    }

    /// Sums credits per team. User attributions are skipped.
    pub fn credit_summary_for_teams(&self) -> BTreeMap<AccountId, i64> {
        let mut summary: BTreeMap<AccountId, i64> = BTreeMap::new();
        for record in &self.records {
            let Some(team_id) = record.attribution_id.team_id() else {
                continue;
            };
            *summary.entry(team_id.clone()).or_default() += record.credits_used;
        }
        summary
    }

    /// Sums credits across every record, regardless of attribution.
    pub fn total_credits(&self) -> i64 {
        self.records.iter().map(|r| r.credits_used).sum()
    }
}

impl From<Vec<UsageRecord>> for UsageReport {
    fn from(records: Vec<UsageRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<UsageRecord> for UsageReport {
    fn from_iter<I: IntoIterator<Item = UsageRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for UsageReport {
    type Item = UsageRecord;
    type IntoIter = std::vec::IntoIter<UsageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a UsageReport {
    type Item = &'a UsageRecord;
    type IntoIter = std::slice::Iter<'a, UsageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
