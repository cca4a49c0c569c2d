//! `SQLite` database connection.
//!
//! The database is stored at `~/.tickvault/tickvault.db`.

use rusqlite::Connection;

use crate::config::Paths;
use crate::error::TickvaultError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Database {
    /// Open the database under `paths`, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open(paths: &Paths) -> Result<Self, TickvaultError> {
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, TickvaultError> {
        let conn = Connection::open(path).map_err(|e| {
            TickvaultError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // Another process may hold the write lock briefly
        conn.busy_timeout(std::time::Duration::from_millis(500))
            .map_err(|e| TickvaultError::Database(format!("Failed to set busy timeout: {e}")))?;

        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, TickvaultError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            TickvaultError::Database(format!("Failed to open in-memory database: {e}"))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, TickvaultError> {
        let db = Self { conn };
        migrations::run(&db.conn)?;
        Ok(db)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, TickvaultError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
