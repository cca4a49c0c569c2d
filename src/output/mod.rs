//! Output formatting for tickvault.
//!
//! This module provides formatters for displaying stored snapshots, the
//! teardown outbox and sync results in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::TickvaultError;
use crate::storage::{OutboxEntry, ReplayReport, StoredSnapshot};

pub use json::*;
pub use pretty::*;

/// Format stored snapshots based on output format
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_snapshots(
    snapshots: &[StoredSnapshot],
    format: OutputFormat,
) -> Result<String, TickvaultError> {
    match format {
        OutputFormat::Pretty => Ok(format_snapshots_pretty(snapshots)),
        OutputFormat::Json => format_snapshots_json(snapshots),
    }
}

/// Format a single stored snapshot based on output format
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_snapshot(
    snapshot: &StoredSnapshot,
    format: OutputFormat,
) -> Result<String, TickvaultError> {
    match format {
        OutputFormat::Pretty => Ok(format_snapshot_pretty(snapshot)),
        OutputFormat::Json => to_json(snapshot),
    }
}

/// Format outbox entries based on output format
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_outbox(entries: &[OutboxEntry], format: OutputFormat) -> Result<String, TickvaultError> {
    match format {
        OutputFormat::Pretty => Ok(format_outbox_pretty(entries)),
        OutputFormat::Json => format_outbox_json(entries),
    }
}

/// Format an outbox replay based on output format
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_replay(report: &ReplayReport, format: OutputFormat) -> Result<String, TickvaultError> {
    match format {
        OutputFormat::Pretty => Ok(format_replay_pretty(report)),
        OutputFormat::Json => to_json(report),
    }
}
