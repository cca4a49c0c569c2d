//! Local snapshot store.
//!
//! [`LocalStore`] is the durable store the CLI persists timers into. It
//! implements [`PersistenceClient`] for the retry executor and
//! [`TeardownDelivery`] for the exit path; teardown payloads land in an
//! outbox table and are applied by [`LocalStore::replay_outbox`] on the next
//! start.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use super::Database;
use crate::config::Paths;
use crate::error::{SyncFailure, TickvaultError};
use crate::features::timer::{SnapshotFields, TimerMode};
use crate::remote::{PersistenceClient, TeardownDelivery, TeardownPayload};

/// A snapshot as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSnapshot {
    /// Entity id.
    pub entity_id: String,
    /// Stored fields.
    #[serde(flatten)]
    pub fields: SnapshotFields,
    /// When the row was last written.
    pub persisted_at: DateTime<Utc>,
}

/// A pending teardown delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxEntry {
    /// Row id.
    pub id: i64,
    /// Endpoint it was addressed to.
    pub endpoint: String,
    /// Raw JSON payload.
    pub payload: String,
    /// When it was written.
    pub created_at: DateTime<Utc>,
}

/// Result of [`LocalStore::replay_outbox`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Payloads written as snapshots.
    pub applied: usize,
    /// Payloads older than the stored snapshot.
    pub stale: usize,
    /// Payloads that could not be decoded and were discarded.
    pub discarded: usize,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TickvaultError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TickvaultError::Database(format!("Invalid timestamp '{raw}': {e}")))
}

fn db_error(context: &str, e: &rusqlite::Error) -> TickvaultError {
    TickvaultError::Database(format!("{context}: {e}"))
}

/// Busy or locked databases clear up on their own; anything else will not.
fn to_sync_failure(source: &rusqlite::Error) -> SyncFailure {
    let message = format!("Failed to write snapshot: {source}");
    match source {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            SyncFailure::timeout(message)
        },
        _ => SyncFailure::local(message),
    }
}

struct RawSnapshot {
    entity_id: String,
    elapsed_seconds: i64,
    mode: String,
    running: bool,
    captured_at: String,
    persisted_at: String,
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawSnapshot> {
    Ok(RawSnapshot {
        entity_id: row.get(0)?,
        elapsed_seconds: row.get(1)?,
        mode: row.get(2)?,
        running: row.get(3)?,
        captured_at: row.get(4)?,
        persisted_at: row.get(5)?,
    })
}

impl RawSnapshot {
    fn decode(self) -> Result<StoredSnapshot, TickvaultError> {
        let mode: TimerMode = serde_json::from_str(&self.mode)?;
        Ok(StoredSnapshot {
            fields: SnapshotFields {
                elapsed_seconds: u64::try_from(self.elapsed_seconds).unwrap_or(0),
                mode,
                running: self.running,
                captured_at: parse_timestamp(&self.captured_at)?,
            },
            persisted_at: parse_timestamp(&self.persisted_at)?,
            entity_id: self.entity_id,
        })
    }
}

fn try_upsert(
    db: &Mutex<Database>,
    entity_id: &str,
    fields: &SnapshotFields,
) -> rusqlite::Result<bool> {
    let mode = serde_json::to_string(&fields.mode)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let elapsed = i64::try_from(fields.elapsed_seconds).unwrap_or(i64::MAX);

    let changed = db.lock().connection().execute(
        r"INSERT INTO entity_snapshots
          (entity_id, elapsed_seconds, mode, running, captured_at, persisted_at)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6)
          ON CONFLICT(entity_id) DO UPDATE SET
            elapsed_seconds = excluded.elapsed_seconds,
            mode = excluded.mode,
            running = excluded.running,
            captured_at = excluded.captured_at,
            persisted_at = excluded.persisted_at
          WHERE excluded.captured_at >= entity_snapshots.captured_at",
        params![
            entity_id,
            elapsed,
            mode,
            fields.running,
            timestamp(fields.captured_at),
            timestamp(Utc::now()),
        ],
    )?;

    if changed == 0 {
        tracing::debug!(entity = entity_id, "ignored snapshot older than stored one");
    }
    Ok(changed > 0)
}

const SNAPSHOT_COLUMNS: &str =
    "entity_id, elapsed_seconds, mode, running, captured_at, persisted_at";

/// `SQLite`-backed snapshot store.
#[derive(Debug)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open the store under `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(paths: &Paths) -> Result<Self, TickvaultError> {
        Ok(Self::with_database(Database::open(paths)?))
    }

    /// Open an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self, TickvaultError> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    /// Wrap an open database.
    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Write a snapshot unless a newer capture is already stored.
    ///
    /// Returns false if the stored row was newer and left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_snapshot(
        &self,
        entity_id: &str,
        fields: &SnapshotFields,
    ) -> Result<bool, TickvaultError> {
        try_upsert(&self.db, entity_id, fields)
            .map_err(|e| db_error("Failed to write snapshot", &e))
    }


    /// Get the stored snapshot for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is malformed.
    pub fn snapshot(&self, entity_id: &str) -> Result<Option<StoredSnapshot>, TickvaultError> {
        let raw = self
            .db
            .lock()
            .connection()
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM entity_snapshots WHERE entity_id = ?1"),
                [entity_id],
                row_to_raw,
            )
            .optional()
            .map_err(|e| db_error("Failed to query snapshot", &e))?;

        raw.map(RawSnapshot::decode).transpose()
    }

    /// All stored snapshots, ordered by entity id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is malformed.
    pub fn list_snapshots(&self) -> Result<Vec<StoredSnapshot>, TickvaultError> {
        let raws = {
            let db = self.db.lock();
            let mut stmt = db
                .connection()
                .prepare(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM entity_snapshots ORDER BY entity_id"
                ))
                .map_err(|e| db_error("Failed to prepare query", &e))?;
            let rows = stmt
                .query_map([], row_to_raw)
                .map_err(|e| db_error("Failed to list snapshots", &e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| db_error("Failed to read snapshot row", &e))?
        };

        raws.into_iter().map(RawSnapshot::decode).collect()
    }

    /// Mark a stored snapshot as no longer running.
    ///
    /// # Errors
    ///
    /// Returns [`TickvaultError::NotFound`] if nothing is stored for
    /// `entity_id`.
    pub fn mark_stopped(&self, entity_id: &str) -> Result<StoredSnapshot, TickvaultError> {
        let stored = self
            .snapshot(entity_id)?
            .ok_or_else(|| TickvaultError::NotFound(format!("No snapshot for '{entity_id}'")))?;

        let fields = SnapshotFields {
            running: false,
            captured_at: Utc::now(),
            ..stored.fields
        };
        self.upsert_snapshot(entity_id, &fields)?;

        self.snapshot(entity_id)?
            .ok_or_else(|| TickvaultError::NotFound(format!("No snapshot for '{entity_id}'")))
    }

    /// Delete the stored snapshot. Returns false if none existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_snapshot(&self, entity_id: &str) -> Result<bool, TickvaultError> {
        self.db
            .lock()
            .connection()
            .execute("DELETE FROM entity_snapshots WHERE entity_id = ?1", [entity_id])
            .map(|n| n > 0)
            .map_err(|e| db_error("Failed to delete snapshot", &e))
    }

    /// Append a teardown payload to the outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not UTF-8 or the write fails.
    pub fn push_outbox(&self, endpoint: &str, payload: &[u8]) -> Result<i64, TickvaultError> {
        let payload = std::str::from_utf8(payload).map_err(|e| {
            TickvaultError::Database(format!("Teardown payload is not UTF-8: {e}"))
        })?;

        let db = self.db.lock();
        db.connection()
            .execute(
                "INSERT INTO teardown_outbox (endpoint, payload, created_at) VALUES (?1, ?2, ?3)",
                params![endpoint, payload, timestamp(Utc::now())],
            )
            .map_err(|e| db_error("Failed to write outbox entry", &e))?;
        Ok(db.connection().last_insert_rowid())
    }

    /// Pending outbox entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn outbox(&self) -> Result<Vec<OutboxEntry>, TickvaultError> {
        let raws: Vec<(i64, String, String, String)> = {
            let db = self.db.lock();
            let mut stmt = db
                .connection()
                .prepare(
                    "SELECT id, endpoint, payload, created_at FROM teardown_outbox ORDER BY id",
                )
                .map_err(|e| db_error("Failed to prepare query", &e))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
                .map_err(|e| db_error("Failed to list outbox", &e))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| db_error("Failed to read outbox row", &e))?
        };

        raws.into_iter()
            .map(|(id, endpoint, payload, created_at)| {
                Ok(OutboxEntry {
                    id,
                    endpoint,
                    payload,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    /// Apply every outbox payload as a snapshot and clear the outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox cannot be read or cleared.
    pub fn replay_outbox(&self) -> Result<ReplayReport, TickvaultError> {
        let mut report = ReplayReport::default();

        for entry in self.outbox()? {
            match serde_json::from_str::<TeardownPayload>(&entry.payload) {
                Ok(payload) => {
                    if self.upsert_snapshot(&payload.entity_id, &payload.fields)? {
                        report.applied += 1;
                    } else {
                        report.stale += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(id = entry.id, error = %e, "discarding undecodable outbox entry");
                    report.discarded += 1;
                },
            }

            self.db
                .lock()
                .connection()
                .execute("DELETE FROM teardown_outbox WHERE id = ?1", [entry.id])
                .map_err(|e| db_error("Failed to clear outbox entry", &e))?;
        }

        if report != ReplayReport::default() {
            tracing::info!(
                applied = report.applied,
                stale = report.stale,
                discarded = report.discarded,
                "teardown outbox replayed"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl PersistenceClient for LocalStore {
    async fn persist_entity_snapshot(
        &self,
        entity_id: &str,
        fields: &SnapshotFields,
    ) -> Result<(), SyncFailure> {
        // SQLite may wait on a busy lock; keep that off the async workers
        let db = Arc::clone(&self.db);
        let (entity_id, fields) = (entity_id.to_string(), fields.clone());
        tokio::task::spawn_blocking(move || try_upsert(&db, &entity_id, &fields))
            .await
            .map_err(|e| SyncFailure::local(format!("Snapshot write task failed: {e}")))?
            .map(|_| ())
            .map_err(|e| to_sync_failure(&e))
    }
}

impl TeardownDelivery for LocalStore {
    fn send(&self, endpoint: &str, payload: &[u8]) -> bool {
        match self.push_outbox(endpoint, payload) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(endpoint, error = %e, "failed to record teardown payload");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use chrono::Duration;

    fn fields(elapsed: u64, running: bool, captured_at: DateTime<Utc>) -> SnapshotFields {
        SnapshotFields {
            elapsed_seconds: elapsed,
            mode: TimerMode::Stopwatch,
            running,
            captured_at,
        }
    }

    #[test]
    fn test_upsert_and_read() {
        let store = LocalStore::in_memory().unwrap();
        let now = Utc::now();

        assert!(store.upsert_snapshot("t1", &fields(10, true, now)).unwrap());
        let stored = store.snapshot("t1").unwrap().unwrap();
        assert_eq!(stored.fields.elapsed_seconds, 10);
        assert!(stored.fields.running);
        assert_eq!(
            timestamp(stored.fields.captured_at),
            timestamp(now),
        );
    }

    #[test]
    fn test_older_capture_never_overwrites() {
        let store = LocalStore::in_memory().unwrap();
        let now = Utc::now();

        store.upsert_snapshot("t1", &fields(60, true, now)).unwrap();
        let applied = store
            .upsert_snapshot("t1", &fields(30, true, now - Duration::seconds(30)))
            .unwrap();

        assert!(!applied);
        assert_eq!(store.snapshot("t1").unwrap().unwrap().fields.elapsed_seconds, 60);
    }

    #[test]
    fn test_same_capture_is_idempotent() {
        let store = LocalStore::in_memory().unwrap();
        let snap = fields(5, false, Utc::now());

        store.upsert_snapshot("t1", &snap).unwrap();
        store.upsert_snapshot("t1", &snap).unwrap();

        assert_eq!(store.list_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn test_list_snapshots_ordered() {
        let store = LocalStore::in_memory().unwrap();
        let now = Utc::now();
        store.upsert_snapshot("b", &fields(1, true, now)).unwrap();
        store.upsert_snapshot("a", &fields(2, true, now)).unwrap();

        let ids: Vec<_> = store
            .list_snapshots()
            .unwrap()
            .into_iter()
            .map(|s| s.entity_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_countdown_mode_round_trips() {
        let store = LocalStore::in_memory().unwrap();
        let snap = SnapshotFields {
            mode: TimerMode::Countdown { total_seconds: 1500 },
            ..fields(1200, true, Utc::now())
        };
        store.upsert_snapshot("t1", &snap).unwrap();

        let stored = store.snapshot("t1").unwrap().unwrap();
        assert_eq!(stored.fields.mode, TimerMode::Countdown { total_seconds: 1500 });
    }

    #[test]
    fn test_mark_stopped() {
        let store = LocalStore::in_memory().unwrap();
        store
            .upsert_snapshot("t1", &fields(42, true, Utc::now() - Duration::seconds(5)))
            .unwrap();

        let stopped = store.mark_stopped("t1").unwrap();
        assert!(!stopped.fields.running);
        assert_eq!(stopped.fields.elapsed_seconds, 42);

        assert!(matches!(
            store.mark_stopped("missing"),
            Err(TickvaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_snapshot() {
        let store = LocalStore::in_memory().unwrap();
        store.upsert_snapshot("t1", &fields(1, true, Utc::now())).unwrap();

        assert!(store.delete_snapshot("t1").unwrap());
        assert!(!store.delete_snapshot("t1").unwrap());
        assert!(store.snapshot("t1").unwrap().is_none());
    }

    #[test]
    fn test_teardown_then_replay() {
        let store = LocalStore::in_memory().unwrap();
        let payload = TeardownPayload {
            entity_id: "t1".to_string(),
            fields: fields(99, false, Utc::now()),
        };

        assert!(store.send("snapshots", &payload.to_json().unwrap()));
        assert!(store.send("snapshots", b"not json"));
        assert_eq!(store.outbox().unwrap().len(), 2);

        let report = store.replay_outbox().unwrap();
        assert_eq!(
            report,
            ReplayReport {
                applied: 1,
                stale: 0,
                discarded: 1
            }
        );
        assert!(store.outbox().unwrap().is_empty());
        assert_eq!(store.snapshot("t1").unwrap().unwrap().fields.elapsed_seconds, 99);
    }

    #[test]
    fn test_replay_skips_stale_payload() {
        let store = LocalStore::in_memory().unwrap();
        let now = Utc::now();
        store.upsert_snapshot("t1", &fields(100, false, now)).unwrap();

        let old = TeardownPayload {
            entity_id: "t1".to_string(),
            fields: fields(50, false, now - Duration::minutes(1)),
        };
        store.send("snapshots", &old.to_json().unwrap());

        let report = store.replay_outbox().unwrap();
        assert_eq!(report.stale, 1);
        assert_eq!(store.snapshot("t1").unwrap().unwrap().fields.elapsed_seconds, 100);
    }

    #[test]
    fn test_send_rejects_non_utf8() {
        let store = LocalStore::in_memory().unwrap();
        assert!(!store.send("snapshots", &[0xff, 0xfe]));
    }

    #[tokio::test]
    async fn test_persistence_client_writes() {
        let store = LocalStore::in_memory().unwrap();
        store
            .persist_entity_snapshot("t1", &fields(7, true, Utc::now()))
            .await
            .unwrap();
        assert_eq!(store.snapshot("t1").unwrap().unwrap().fields.elapsed_seconds, 7);
    }

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn test_persistence_write_runs_off_the_runtime_thread() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let held = store.db.lock();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .persist_entity_snapshot("t1", &fields(3, true, Utc::now()))
                    .await
            })
        };

        // The single runtime thread keeps running while the write waits
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(held);
        writer.await.unwrap().unwrap();
        assert_eq!(store.snapshot("t1").unwrap().unwrap().fields.elapsed_seconds, 3);
    }

    #[test]
    fn test_busy_maps_to_timeout() {
        let source = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(to_sync_failure(&source).kind, FailureKind::Timeout);

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert_eq!(to_sync_failure(&other).kind, FailureKind::Local);
    }
}
