//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Largest accepted relative offset, in days.
const MAX_RELATIVE_DAYS: i64 = 100 * 365;

/// Parses a window boundary.
///
/// Accepts RFC 3339 (`2022-05-01T00:00:00Z`), a bare date taken as UTC
/// midnight (`2022-05-01`), or an offset before `now` (`2 hours ago`).
pub fn parse_datetime_at(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        bail!(
            "invalid datetime: {s}. Use RFC 3339 (e.g. 2022-05-01T00:00:00Z), a date (2022-05-01) or a relative time (e.g. '2 hours ago')"
        );
    };
    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let offset = match &caps[2] {
        "minute" => Duration::try_minutes(n),
        "hour" => Duration::try_hours(n),
        "day" => Duration::try_days(n),
        "week" => Duration::try_weeks(n),
        unit => bail!("unknown time unit: {unit}"),
    }
    .filter(|offset| *offset <= Duration::days(MAX_RELATIVE_DAYS))
    .with_context(|| format!("relative time value too large: {s}"))?;

    Ok(now - offset)
}
