//! Path resolution for tickvault configuration and data files.
//!
//! All tickvault data is stored in `~/.tickvault/`:
//! - `config.yaml` - Main configuration file
//! - `tickvault.db` - `SQLite` store for snapshots and the teardown outbox

use std::path::PathBuf;

use crate::error::TickvaultError;

/// Paths to tickvault configuration and data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root directory: `~/.tickvault/`
    pub root: PathBuf,
    /// Config file: `~/.tickvault/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.tickvault/tickvault.db`
    pub database: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, TickvaultError> {
        let home = std::env::var_os("HOME").ok_or_else(|| {
            TickvaultError::Config("Could not determine home directory".to_string())
        })?;
        Ok(Self::with_root(PathBuf::from(home).join(".tickvault")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("tickvault.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), TickvaultError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                TickvaultError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_root(PathBuf::from(".tickvault")))
    }
}
