//! Stored snapshot inspection.

use crate::cli::args::OutputFormat;
use crate::error::TickvaultError;
use crate::output::{format_snapshot, format_snapshots};
use crate::storage::LocalStore;

/// Show one stored snapshot, or all of them.
///
/// # Errors
///
/// Returns [`TickvaultError::NotFound`] if `entity` has no snapshot.
pub fn status(
    store: &LocalStore,
    entity: Option<&str>,
    format: OutputFormat,
) -> Result<String, TickvaultError> {
    match entity {
        Some(id) => {
            let snapshot = store
                .snapshot(id)?
                .ok_or_else(|| TickvaultError::NotFound(format!("No snapshot for '{id}'")))?;
            format_snapshot(&snapshot, format)
        },
        None => format_snapshots(&store.list_snapshots()?, format),
    }
}
