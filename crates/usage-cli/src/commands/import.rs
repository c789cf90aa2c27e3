//! Import command for loading workspace instances into the local `SQLite` store.
//!
//! Reads one JSON instance record per line, e.g.
//!
//! ```json
//! {"id":"...","workspace_id":"...","owner_id":"...","usage_attribution_id":"team:...","creation_time":"2022-05-30T00:00:00Z"}
//! ```
//!
//! Records replace any stored instance with the same `id`.

use std::io::BufRead;

use anyhow::{Context, Result};

use usage_core::InstanceRecord;
use usage_db::Database;

pub fn run<R: BufRead>(reader: R, db: &mut Database) -> Result<usize> {
    let instances = parse_instances(reader)?;
    let written = db
        .insert_instances(&instances)
        .context("failed to store workspace instances")?;
    Ok(written)
}

fn parse_instances<R: BufRead>(reader: R) -> Result<Vec<InstanceRecord>> {
    let mut instances = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: InstanceRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid instance on line {}", idx + 1))?;
        instances.push(record);
    }
    Ok(instances)
}
