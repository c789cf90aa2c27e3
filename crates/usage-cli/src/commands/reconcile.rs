//! Reconcile command: turn instance runtimes in a window into stored usage.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use usage_core::{
    BillingController, Clock, NoOpBillingController, ReconcileError, ReconcileOutcome,
    ReconcileStatus, ReconcileWindow, SystemClock, UsageReconciler, WorkspacePricer,
};
use usage_db::{Database, UpsertStats};

use super::summary::{TeamSummary, write_team_summary};
use super::util::parse_datetime_at;
use crate::Config;

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Window start, inclusive (RFC 3339, a date, or e.g. "2 days ago").
    #[arg(long)]
    pub from: String,

    /// Window end, exclusive.
    #[arg(long)]
    pub to: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,

    /// Compute usage without storing it or notifying billing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Output, persistence and cancellation settings for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub json: bool,
    pub dry_run: bool,
    /// Aborts the instance read when cancelled; nothing is stored or billed.
    pub cancel: CancellationToken,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &ReconcileArgs,
    db: &mut Database,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let start = parse_datetime_at(&args.from, now).context("invalid --from")?;
    let end = parse_datetime_at(&args.to, now).context("invalid --to")?;
    let window = ReconcileWindow::new(start, end)?;

    let pricer = config.pricer().context("invalid pricing configuration")?;
    let billing: Box<dyn BillingController> = if args.dry_run {
        Box::new(NoOpBillingController)
    } else {
        config.billing.controller()?
    };
    // Nothing cancels this token from the binary. Ctrl-C ends the process and
    // the usage upsert is a single transaction.
    let options = RunOptions {
        json: args.json,
        dry_run: args.dry_run,
        cancel: CancellationToken::new(),
    };

    execute(writer, db, billing, SystemClock, pricer, window, &options)
}

/// Runs reconciliation against `db`, stores the result and prints it.
///
/// Usage records are stored even when billing fails, so the report is not
/// lost. The billing failure is still returned.
pub fn execute<W, B, C>(
    writer: &mut W,
    db: &mut Database,
    billing: B,
    clock: C,
    pricer: WorkspacePricer,
    window: ReconcileWindow,
    options: &RunOptions,
) -> Result<()>
where
    W: Write,
    B: BillingController,
    C: Clock,
{
    let result = {
        let reconciler = UsageReconciler::new(&*db, billing, clock, pricer);
        reconciler.reconcile_time_range(&options.cancel, window.start(), window.end())
    };

    let (outcome, billing_error) = match result {
        Ok(outcome) => (outcome, None),
        Err(ReconcileError::Billing { source, outcome }) => (*outcome, Some(source)),
        Err(err) => return Err(err).context("usage reconciliation failed"),
    };

    let stored = if options.dry_run {
        None
    } else {
        Some(
            db.upsert_usage_records(&outcome.report)
                .context("failed to store usage records")?,
        )
    };

    if options.json {
        write_json(writer, &outcome, stored)?;
    } else {
        write_human(writer, &outcome, stored)?;
    }

    if let Some(err) = billing_error {
        return Err(err).context("failed to dispatch usage report to billing");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReconcileJson<'a> {
    status: &'a ReconcileStatus,
    usage_records: usize,
    /// `None` on dry runs.
    stored: Option<StoredJson>,
    #[serde(flatten)]
    summary: TeamSummary,
}

#[derive(Debug, Serialize)]
struct StoredJson {
    inserted: usize,
    updated: usize,
    unchanged: usize,
}

impl From<UpsertStats> for StoredJson {
    fn from(stats: UpsertStats) -> Self {
        Self {
            inserted: stats.inserted,
            updated: stats.updated,
            unchanged: stats.unchanged,
        }
    }
}

fn write_json<W: Write>(
    writer: &mut W,
    outcome: &ReconcileOutcome,
    stored: Option<UpsertStats>,
) -> Result<()> {
    let payload = ReconcileJson {
        status: &outcome.status,
        usage_records: outcome.report.len(),
        stored: stored.map(StoredJson::from),
        summary: TeamSummary::from_report(&outcome.report),
    };
    serde_json::to_writer_pretty(&mut *writer, &payload)?;
    writeln!(writer)?;
    Ok(())
}

fn write_human<W: Write>(
    writer: &mut W,
    outcome: &ReconcileOutcome,
    stored: Option<UpsertStats>,
) -> Result<()> {
    let status = &outcome.status;
    writeln!(
        writer,
        "Window:              {} .. {}",
        status.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        status.end_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    writeln!(
        writer,
        "Workspace instances: {} billed, {} invalid",
        status.workspace_instances, status.invalid_workspace_instances
    )?;
    match stored {
        Some(stats) => writeln!(
            writer,
            "Usage records:       {} ({} new, {} updated, {} unchanged)",
            outcome.report.len(),
            stats.inserted,
            stats.updated,
            stats.unchanged
        )?,
        None => writeln!(
            writer,
            "Usage records:       {} (dry run, not stored)",
            outcome.report.len()
        )?,
    }
    writeln!(writer)?;
    write_team_summary(writer, &TeamSummary::from_report(&outcome.report))
}
