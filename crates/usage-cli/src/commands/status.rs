//! Status command for showing what the local store holds.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use usage_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let counts = db.counts().context("failed to count stored rows")?;

    writeln!(writer, "Usage status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Workspace instances: {}", counts.workspace_instances)?;
    writeln!(writer, "Usage records: {}", counts.usage_records)?;

    Ok(())
}
