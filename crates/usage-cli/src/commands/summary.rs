//! Summary command: credits per team over stored usage records.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use usage_core::UsageReport;
use usage_db::Database;

/// Credits per team, as printed by `usage summary` and `usage reconcile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    pub teams: BTreeMap<String, i64>,
    /// Sum over teams; user-attributed usage is not included.
    pub total_credits: i64,
}

impl TeamSummary {
    pub fn from_report(report: &UsageReport) -> Self {
        let teams: BTreeMap<String, i64> = report
            .credit_summary_for_teams()
            .into_iter()
            .map(|(team, credits)| (team.as_str().to_string(), credits))
            .collect();
        let total_credits = teams.values().sum();
        Self {
            teams,
            total_credits,
        }
    }
}

pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let report: UsageReport = db
        .list_usage_records()
        .context("failed to load usage records")?
        .into_iter()
        .filter(|record| !record.deleted)
        .collect();
    let summary = TeamSummary::from_report(&report);

    if json {
        serde_json::to_writer_pretty(&mut *writer, &summary)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "Usage records: {}", report.len())?;
    writeln!(writer)?;
    write_team_summary(writer, &summary)
}

/// Writes the human-readable team credit table.
pub fn write_team_summary<W: Write>(writer: &mut W, summary: &TeamSummary) -> Result<()> {
    writeln!(writer, "TEAM CREDITS")?;
    writeln!(writer, "────────────")?;
    if summary.teams.is_empty() {
        writeln!(writer, "No team usage recorded.")?;
        return Ok(());
    }

    let width = summary
        .teams
        .keys()
        .map(String::len)
        .max()
        .unwrap_or_default()
        .max("Total".len());
    for (team, credits) in &summary.teams {
        writeln!(writer, "{team:<width$}  {credits:>10}")?;
    }
    writeln!(writer, "{:<width$}  {:>10}", "Total", summary.total_credits)?;
    Ok(())
}
