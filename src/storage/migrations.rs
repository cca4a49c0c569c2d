//! Database migrations for tickvault.
//!
//! Each migration upgrades the schema by one version. The version lives in
//! `PRAGMA user_version` and migrations run when the database is opened.

use rusqlite::Connection;

use crate::error::TickvaultError;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Get the current schema version. Returns 0 for a new database.
pub fn get_version(conn: &Connection) -> Result<i32, TickvaultError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| TickvaultError::Database(format!("Failed to get schema version: {e}")))
}

fn set_version(conn: &Connection, version: i32) -> Result<(), TickvaultError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| TickvaultError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), TickvaultError> {
    let current = get_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(TickvaultError::Database(format!(
            "Database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
        tracing::debug!(version, "applied migration");
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), TickvaultError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(TickvaultError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: snapshots and the teardown outbox.
///
/// `captured_at` is stored as fixed-width RFC 3339 UTC so text comparison
/// orders by time.
fn migrate_v1(conn: &Connection) -> Result<(), TickvaultError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS entity_snapshots (
            entity_id TEXT PRIMARY KEY,
            elapsed_seconds INTEGER NOT NULL,
            mode TEXT NOT NULL,
            running INTEGER NOT NULL DEFAULT 0,
            captured_at TEXT NOT NULL,
            persisted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS teardown_outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_teardown_outbox_created
        ON teardown_outbox(created_at);
        ",
    )
    .map_err(|e| TickvaultError::Database(format!("Migration v1 failed: {e}")))
}
