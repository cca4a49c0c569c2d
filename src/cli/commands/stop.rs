//! Mark a stored timer as stopped.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::TickvaultError;
use crate::features::timer::format_clock;
use crate::output::to_json;
use crate::storage::LocalStore;

/// Mark the stored snapshot for `entity` as not running.
///
/// # Errors
///
/// Returns [`TickvaultError::NotFound`] if `entity` has no snapshot.
pub fn stop(store: &LocalStore, entity: &str, format: OutputFormat) -> Result<String, TickvaultError> {
    let snapshot = store.mark_stopped(entity)?;
    tracing::info!(entity, elapsed = snapshot.fields.elapsed_seconds, "marked stopped");

    match format {
        OutputFormat::Pretty => Ok(format!(
            "{} Stopped {} at {}",
            "■".yellow(),
            snapshot.entity_id.bold(),
            format_clock(snapshot.fields.elapsed_seconds).cyan()
        )),
        OutputFormat::Json => to_json(&snapshot),
    }
}
