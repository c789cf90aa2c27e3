//! Storage layer for usage reconciliation.
//!
//! Provides persistence for workspace instances and usage records using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without external
//! synchronization (e.g. a `Mutex<Database>`), or use one `Database` per thread.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with a fixed nine-digit
//! fraction (e.g. `2022-05-31T23:00:00.000000000Z`). Every write goes through
//! [`format_timestamp`], so values round-trip exactly, lexicographic ordering
//! matches chronological ordering and the overlap query can compare strings
//! directly.
//!
//! Missing instance timestamps are stored as the empty string rather than
//! NULL, matching the upstream workspace-instance table this mirrors.
//!
//! ## Usage Generations
//!
//! `workspace_instance_usage` is keyed by instance ID. Re-reconciling an
//! instance overwrites its row and bumps `generation_id` only when the
//! computed usage actually changed, so repeated runs over overlapping windows
//! are idempotent.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use usage_core::{
    AttributionId, InstanceRecord, InstanceSource, QueryError, ReconcileWindow, UsageRecord,
    UsageReport, WorkspaceId, WorkspaceType,
};
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for {id}: {timestamp}")]
    TimestampParse {
        id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row violates the data model.
    #[error("invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },
    /// A read observed cancellation before it completed.
    #[error("query cancelled")]
    Cancelled,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Row counts reported by `usage status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub workspace_instances: usize,
    pub usage_records: usize,
}

/// Outcome of writing a usage report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Instances seen for the first time.
    pub inserted: usize,
    /// Instances whose usage changed; their generation was bumped.
    pub updated: usize,
    /// Instances whose stored usage already matched.
    pub unchanged: usize,
}

const INSTANCE_COLUMNS: &str = "id, workspace_id, owner_id, project_id, workspace_class, type, \
     usage_attribution_id, creation_time, started_time, stopped_time";

const USAGE_COLUMNS: &str = "instance_id, attribution_id, user_id, workspace_id, project_id, \
     workspace_type, workspace_class, credits_used, started_at, stopped_at, generation_id, deleted";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Workspace instances: one row per runtime instance
            -- *_time columns: RFC 3339 UTC text, '' when unknown
            CREATE TABLE IF NOT EXISTS workspace_instances (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                project_id TEXT,
                workspace_class TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL DEFAULT 'regular',
                usage_attribution_id TEXT NOT NULL,
                creation_time TEXT NOT NULL DEFAULT '',
                started_time TEXT NOT NULL DEFAULT '',
                stopped_time TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_instances_creation ON workspace_instances(creation_time);
            CREATE INDEX IF NOT EXISTS idx_instances_stopped ON workspace_instances(stopped_time);

            CREATE TABLE IF NOT EXISTS workspace_instance_usage (
                instance_id TEXT PRIMARY KEY,
                attribution_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                project_id TEXT NOT NULL DEFAULT '',
                workspace_type TEXT NOT NULL,
                workspace_class TEXT NOT NULL,
                credits_used INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                stopped_at TEXT,
                generation_id INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_usage_attribution ON workspace_instance_usage(attribution_id);
            CREATE INDEX IF NOT EXISTS idx_usage_started ON workspace_instance_usage(started_at);
            ",
        )?;
        Ok(())
    }

    /// Inserts workspace instances, replacing existing rows with the same ID.
    ///
    /// Instances are re-imported as they progress (e.g. once they stop), so
    /// the latest write wins.
    pub fn insert_instances(&mut self, instances: &[InstanceRecord]) -> Result<usize, DbError> {
        if instances.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO workspace_instances ({INSTANCE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))?;
            for instance in instances {
                written += stmt.execute(params![
                    instance.id.to_string(),
                    instance.workspace_id.as_str(),
                    instance.owner_id.to_string(),
                    instance.project_id,
                    instance.workspace_class,
                    instance.workspace_type.as_str(),
                    instance.attribution_id.to_string(),
                    format_optional(instance.creation_time),
                    format_optional(instance.started_time),
                    format_optional(instance.stopped_time),
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Lists instances overlapping the window, ordered by creation time then ID.
    ///
    /// Overlap follows [`ReconcileWindow::overlaps`]: created before `end`
    /// (or creation time unknown) and still running or stopped after `start`.
    pub fn instances_overlapping(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceRecord>, DbError> {
        self.scan_overlapping(window, cancel, |_| {})
    }

    /// Runs the overlap query, calling `on_row` after each decoded row.
    ///
    /// Cancellation is checked before every row; a cancelled scan discards
    /// the rows read so far.
    fn scan_overlapping<F>(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
        mut on_row: F,
    ) -> Result<Vec<InstanceRecord>, DbError>
    where
        F: FnMut(&InstanceRecord),
    {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {INSTANCE_COLUMNS}
            FROM workspace_instances
            WHERE (creation_time = '' OR creation_time < ?1)
              AND (stopped_time = '' OR stopped_time > ?2)
            ORDER BY creation_time ASC, id ASC
            "
        ))?;
        let mut rows = stmt.query(params![
            format_timestamp(window.end()),
            format_timestamp(window.start()),
        ])?;
        let mut instances = Vec::new();
        while let Some(row) = rows.next()? {
            if cancel.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            let instance = instance_from_row(row)?;
            on_row(&instance);
            instances.push(instance);
        }
        tracing::debug!(count = instances.len(), "queried overlapping workspace instances");
        Ok(instances)
    }

    /// Writes a usage report, bumping generations for changed instances.
    pub fn upsert_usage_records(&mut self, report: &UsageReport) -> Result<UpsertStats, DbError> {
        let mut stats = UpsertStats::default();
        if report.is_empty() {
            return Ok(stats);
        }
        let tx = self.conn.transaction()?;
        {
            let mut select = tx.prepare(&format!(
                "SELECT {USAGE_COLUMNS} FROM workspace_instance_usage WHERE instance_id = ?"
            ))?;
            let mut write = tx.prepare(&format!(
                "INSERT OR REPLACE INTO workspace_instance_usage ({USAGE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))?;
            for record in report {
                let instance_id = record.instance_id.to_string();
                let existing = select
                    .query_row([&instance_id], |row| Ok(usage_from_row(row)))
                    .optional()?
                    .transpose()?;

                let generation_id = match existing {
                    None => {
                        stats.inserted += 1;
                        record.generation_id
                    }
                    Some(stored) if same_usage(&stored, record) => {
                        stats.unchanged += 1;
                        continue;
                    }
                    Some(stored) => {
                        stats.updated += 1;
                        stored.generation_id + 1
                    }
                };

                write.execute(params![
                    instance_id,
                    record.attribution_id.to_string(),
                    record.user_id.to_string(),
                    record.workspace_id.as_str(),
                    record.project_id,
                    record.workspace_type.as_str(),
                    record.workspace_class,
                    record.credits_used,
                    format_timestamp(record.started_at),
                    record.stopped_at.map(format_timestamp),
                    generation_id,
                    record.deleted,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(
            inserted = stats.inserted,
            updated = stats.updated,
            unchanged = stats.unchanged,
            "stored usage records"
        );
        Ok(stats)
    }

    /// Lists stored usage records ordered by start time then instance ID.
    pub fn list_usage_records(&self) -> Result<Vec<UsageRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {USAGE_COLUMNS}
            FROM workspace_instance_usage
            ORDER BY started_at ASC, instance_id ASC
            "
        ))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(usage_from_row(row)?);
        }
        Ok(records)
    }

    /// Counts stored instances and usage records.
    pub fn counts(&self) -> Result<StoreCounts, DbError> {
        let workspace_instances: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM workspace_instances", [], |row| {
                    row.get(0)
                })?;
        let usage_records: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM workspace_instance_usage", [], |row| {
                    row.get(0)
                })?;
        Ok(StoreCounts {
            workspace_instances: usize::try_from(workspace_instances).unwrap_or_default(),
            usage_records: usize::try_from(usage_records).unwrap_or_default(),
        })
    }
}

impl InstanceSource for Database {
    fn list_instances_overlapping(
        &self,
        window: &ReconcileWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceRecord>, QueryError> {
        self.instances_overlapping(window, cancel)
            .map_err(|err| match err {
                DbError::Cancelled => QueryError::Cancelled,
                other => QueryError::backend(other),
            })
    }
}

/// Compares everything except the storage-owned generation.
fn same_usage(stored: &UsageRecord, computed: &UsageRecord) -> bool {
    UsageRecord {
        generation_id: computed.generation_id,
        ..stored.clone()
    } == *computed
}

fn instance_from_row(row: &Row<'_>) -> Result<InstanceRecord, DbError> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let owner_id: String = row.get(2)?;
    let project_id: Option<String> = row.get(3)?;
    let workspace_class: String = row.get(4)?;
    let workspace_type: String = row.get(5)?;
    let attribution_id: String = row.get(6)?;
    let creation_time: String = row.get(7)?;
    let started_time: String = row.get(8)?;
    let stopped_time: String = row.get(9)?;

    Ok(InstanceRecord {
        id: parse_uuid(&id, &id)?,
        workspace_id: WorkspaceId::new(workspace_id).map_err(|err| invalid(&id, err))?,
        owner_id: parse_uuid(&owner_id, &id)?,
        project_id: project_id.filter(|p| !p.is_empty()),
        workspace_class,
        workspace_type: workspace_type.parse().map_err(|err| invalid(&id, err))?,
        attribution_id: attribution_id
            .parse::<AttributionId>()
            .map_err(|err| invalid(&id, err))?,
        creation_time: parse_optional(&creation_time, &id)?,
        started_time: parse_optional(&started_time, &id)?,
        stopped_time: parse_optional(&stopped_time, &id)?,
    })
}

fn usage_from_row(row: &Row<'_>) -> Result<UsageRecord, DbError> {
    let instance_id: String = row.get(0)?;
    let attribution_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let workspace_id: String = row.get(3)?;
    let workspace_type: String = row.get(5)?;
    let started_at: String = row.get(8)?;
    let stopped_at: Option<String> = row.get(9)?;

    Ok(UsageRecord {
        instance_id: parse_uuid(&instance_id, &instance_id)?,
        attribution_id: attribution_id
            .parse()
            .map_err(|err| invalid(&instance_id, err))?,
        user_id: parse_uuid(&user_id, &instance_id)?,
        workspace_id: WorkspaceId::new(workspace_id).map_err(|err| invalid(&instance_id, err))?,
        project_id: row.get(4)?,
        workspace_type: workspace_type
            .parse::<WorkspaceType>()
            .map_err(|err| invalid(&instance_id, err))?,
        workspace_class: row.get(6)?,
        credits_used: row.get(7)?,
        started_at: parse_timestamp(&started_at, &instance_id)?,
        stopped_at: stopped_at
            .map(|ts| parse_timestamp(&ts, &instance_id))
            .transpose()?,
        generation_id: row.get(10)?,
        deleted: row.get(11)?,
    })
}

fn invalid(id: &str, err: impl std::fmt::Display) -> DbError {
    DbError::InvalidRecord {
        id: id.to_string(),
        message: err.to_string(),
    }
}

fn parse_uuid(value: &str, id: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|err| invalid(id, err))
}

fn parse_timestamp(timestamp: &str, id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn parse_optional(timestamp: &str, id: &str) -> Result<Option<DateTime<Utc>>, DbError> {
    if timestamp.is_empty() {
        return Ok(None);
    }
    parse_timestamp(timestamp, id).map(Some)
}

/// Formats a timestamp the way every stored column expects it.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn format_optional(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp.map(format_timestamp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::TimeZone;
    use usage_core::{InMemoryInstances, WorkspacePricer, instances_to_usage_records, partition_instances};

    fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, month, day, hour, 0, 0).unwrap()
    }

    fn may() -> ReconcileWindow {
        ReconcileWindow::new(at(5, 1, 0), at(6, 1, 0)).unwrap()
    }

    fn instance(
        creation_time: Option<DateTime<Utc>>,
        stopped_time: Option<DateTime<Utc>>,
    ) -> InstanceRecord {
        InstanceRecord {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::new("gitpodio-gitpod-abc123").unwrap(),
            owner_id: Uuid::new_v4(),
            project_id: None,
            workspace_class: "default".to_string(),
            workspace_type: WorkspaceType::Regular,
            attribution_id: AttributionId::team("team-1").unwrap(),
            creation_time,
            started_time: creation_time,
            stopped_time,
        }
    }

    fn report_for(instances: Vec<InstanceRecord>, cutoff: DateTime<Utc>) -> UsageReport {
        let (billable, _) = partition_instances(instances);
        instances_to_usage_records(&billable, &WorkspacePricer::default(), cutoff)
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "workspace_instances"),
            vec![
                "id",
                "workspace_id",
                "owner_id",
                "project_id",
                "workspace_class",
                "type",
                "usage_attribution_id",
                "creation_time",
                "started_time",
                "stopped_time",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "workspace_instance_usage"),
            vec![
                "instance_id",
                "attribution_id",
                "user_id",
                "workspace_id",
                "project_id",
                "workspace_type",
                "workspace_class",
                "credits_used",
                "started_at",
                "stopped_at",
                "generation_id",
                "deleted",
            ]
        );

        let instance_indexes = index_names(&db.conn, "workspace_instances");
        assert!(instance_indexes.contains("idx_instances_creation"));
        assert!(instance_indexes.contains("idx_instances_stopped"));
        let usage_indexes = index_names(&db.conn, "workspace_instance_usage");
        assert!(usage_indexes.contains("idx_usage_attribution"));
        assert!(usage_indexes.contains("idx_usage_started"));
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn insert_instances_replaces_by_id() {
        let mut db = Database::open_in_memory().unwrap();
        let mut running = instance(Some(at(5, 2, 0)), None);
        db.insert_instances(&[running.clone()]).unwrap();

        running.stopped_time = Some(at(5, 2, 5));
        db.insert_instances(&[running.clone()]).unwrap();

        let stored = db
            .instances_overlapping(&may(), &CancellationToken::new())
            .unwrap();
        assert_eq!(stored, vec![running]);
        assert_eq!(db.counts().unwrap().workspace_instances, 1);
    }

    #[test]
    fn instances_roundtrip_all_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let mut record = instance(Some(at(5, 2, 0)), Some(at(5, 3, 0)));
        record.project_id = Some(Uuid::new_v4().to_string());
        record.workspace_class = "g1-large".to_string();
        record.workspace_type = WorkspaceType::Prebuild;
        record.attribution_id = AttributionId::user("user-1").unwrap();
        record.started_time = Some(at(5, 2, 1));
        db.insert_instances(&[record.clone()]).unwrap();

        let stored = db
            .instances_overlapping(&may(), &CancellationToken::new())
            .unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[test]
    fn overlap_query_uses_half_open_window() {
        let mut db = Database::open_in_memory().unwrap();
        let window = may();
        let stopped_at_start = instance(Some(at(4, 20, 0)), Some(window.start()));
        let created_at_end = instance(Some(window.end()), None);
        let spanning = instance(Some(at(4, 20, 0)), Some(at(6, 2, 0)));
        let running = instance(Some(at(5, 30, 0)), None);
        let missing_creation = instance(None, Some(at(6, 1, 1)));
        let all = vec![
            stopped_at_start,
            created_at_end,
            spanning.clone(),
            running.clone(),
            missing_creation.clone(),
        ];
        db.insert_instances(&all).unwrap();

        let stored = db
            .instances_overlapping(&window, &CancellationToken::new())
            .unwrap();
        let ids: HashSet<_> = stored.iter().map(|r| r.id).collect();
        let expected: HashSet<_> = [spanning.id, running.id, missing_creation.id].into();
        assert_eq!(ids, expected);

        // The in-memory source applies the same rule.
        let in_memory = InMemoryInstances::new(all)
            .list_instances_overlapping(&window, &CancellationToken::new())
            .unwrap();
        let in_memory_ids: HashSet<_> = in_memory.iter().map(|r| r.id).collect();
        assert_eq!(in_memory_ids, expected);
    }

    #[test]
    fn sub_millisecond_stop_times_keep_overlapping() {
        let mut db = Database::open_in_memory().unwrap();
        let window = may();
        let stopped_just_after_start = instance(
            Some(window.start() - chrono::Duration::hours(1)),
            Some(window.start() + chrono::Duration::microseconds(400)),
        );
        db.insert_instances(&[stopped_just_after_start.clone()])
            .unwrap();

        let in_memory = InMemoryInstances::new(vec![stopped_just_after_start.clone()])
            .list_instances_overlapping(&window, &CancellationToken::new())
            .unwrap();
        let stored = db
            .instances_overlapping(&window, &CancellationToken::new())
            .unwrap();

        assert_eq!(in_memory.len(), 1);
        assert_eq!(stored, in_memory);
    }

    #[test]
    fn sub_millisecond_usage_is_unchanged_on_rerun() {
        let mut db = Database::open_in_memory().unwrap();
        let running = instance(
            Some(at(5, 30, 0) + chrono::Duration::nanoseconds(123_456_789)),
            None,
        );
        let report = report_for(vec![running], at(5, 31, 23));

        db.upsert_usage_records(&report).unwrap();
        let stats = db.upsert_usage_records(&report).unwrap();

        assert_eq!(stats.unchanged, 1);
        assert_eq!(db.list_usage_records().unwrap(), report.into_records());
    }

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = format_timestamp(at(5, 1, 0) + chrono::Duration::microseconds(400));
        let later = format_timestamp(at(5, 1, 0) + chrono::Duration::milliseconds(1));
        assert_eq!(earlier, "2022-05-01T00:00:00.000400000Z");
        assert!(earlier < later);
        assert!(format_timestamp(at(5, 1, 0)) < earlier);
    }

    #[test]
    fn cancellation_mid_scan_discards_partial_results() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_instances(&[
            instance(Some(at(5, 2, 0)), None),
            instance(Some(at(5, 3, 0)), None),
            instance(Some(at(5, 4, 0)), None),
        ])
        .unwrap();
        let cancel = CancellationToken::new();
        let mut seen = 0;

        let result = db.scan_overlapping(&may(), &cancel, |_| {
            seen += 1;
            cancel.cancel();
        });

        assert!(matches!(result, Err(DbError::Cancelled)));
        assert_eq!(seen, 1);
    }

    #[test]
    fn cancelled_query_returns_cancelled() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_instances(&[instance(Some(at(5, 2, 0)), None)])
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            db.instances_overlapping(&may(), &cancel),
            Err(DbError::Cancelled)
        ));
        assert!(matches!(
            db.list_instances_overlapping(&may(), &cancel),
            Err(QueryError::Cancelled)
        ));
    }

    #[test]
    fn corrupt_rows_surface_as_query_errors() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO workspace_instances
                 (id, workspace_id, owner_id, usage_attribution_id, creation_time)
                 VALUES (?, 'ws-1', ?, 'team:t-1', '2022-05-02 noon')",
                params![Uuid::new_v4().to_string(), Uuid::new_v4().to_string()],
            )
            .unwrap();

        let err = db
            .instances_overlapping(&may(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DbError::TimestampParse { .. }));

        let err = db
            .list_instances_overlapping(&may(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::Backend(_)));
    }

    #[test]
    fn upsert_is_idempotent_for_unchanged_usage() {
        let mut db = Database::open_in_memory().unwrap();
        let report = report_for(vec![instance(Some(at(5, 30, 0)), None)], at(5, 31, 23));

        let first = db.upsert_usage_records(&report).unwrap();
        assert_eq!(
            first,
            UpsertStats {
                inserted: 1,
                updated: 0,
                unchanged: 0
            }
        );
        let second = db.upsert_usage_records(&report).unwrap();
        assert_eq!(second.unchanged, 1);

        let stored = db.list_usage_records().unwrap();
        assert_eq!(stored, report.into_records());
        assert_eq!(stored[0].generation_id, 0);
    }

    #[test]
    fn upsert_bumps_generation_when_usage_changes() {
        let mut db = Database::open_in_memory().unwrap();
        let running = instance(Some(at(5, 30, 0)), None);

        db.upsert_usage_records(&report_for(vec![running.clone()], at(5, 31, 0)))
            .unwrap();
        let stats = db
            .upsert_usage_records(&report_for(vec![running.clone()], at(5, 31, 23)))
            .unwrap();
        assert_eq!(stats.updated, 1);

        let stored = db.list_usage_records().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].credits_used, 470);
        assert_eq!(stored[0].generation_id, 1);

        let mut stopped = running;
        stopped.stopped_time = Some(at(6, 1, 1));
        db.upsert_usage_records(&report_for(vec![stopped], at(5, 31, 23)))
            .unwrap();
        let stored = db.list_usage_records().unwrap();
        assert_eq!(stored[0].generation_id, 2);
        assert_eq!(stored[0].stopped_at, Some(at(6, 1, 1)));
    }

    #[test]
    fn list_usage_records_orders_by_start() {
        let mut db = Database::open_in_memory().unwrap();
        let later = instance(Some(at(5, 20, 0)), Some(at(5, 20, 1)));
        let earlier = instance(Some(at(5, 10, 0)), Some(at(5, 10, 2)));
        db.upsert_usage_records(&report_for(vec![later, earlier.clone()], at(6, 1, 0)))
            .unwrap();

        let stored = db.list_usage_records().unwrap();
        assert_eq!(stored[0].instance_id, earlier.id);
        assert_eq!(stored[0].credits_used, 20);
        assert_eq!(stored[1].credits_used, 10);
    }

    #[test]
    fn counts_reflect_both_tables() {
        let mut db = Database::open_in_memory().unwrap();
        let records = vec![
            instance(Some(at(5, 2, 0)), None),
            instance(None, Some(at(5, 3, 0))),
        ];
        db.insert_instances(&records).unwrap();
        db.upsert_usage_records(&report_for(records, at(5, 3, 0)))
            .unwrap();

        assert_eq!(
            db.counts().unwrap(),
            StoreCounts {
                workspace_instances: 2,
                usage_records: 1,
            }
        );
    }

    #[test]
    fn database_persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("usage.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.insert_instances(&[instance(Some(at(5, 2, 0)), None)])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.counts().unwrap().workspace_instances, 1);
    }
}
