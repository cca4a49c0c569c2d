//! JSON output formatting for tickvault.

use serde::Serialize;
use serde_json::json;

use crate::error::TickvaultError;
use crate::storage::{OutboxEntry, StoredSnapshot};

/// Format stored snapshots as JSON
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_snapshots_json(snapshots: &[StoredSnapshot]) -> Result<String, TickvaultError> {
    let output = json!({
        "count": snapshots.len(),
        "running": snapshots.iter().filter(|s| s.fields.running).count(),
        "items": snapshots
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format outbox entries as JSON
///
/// Payloads are embedded as JSON values when they parse, raw strings otherwise.
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn format_outbox_json(entries: &[OutboxEntry]) -> Result<String, TickvaultError> {
    let items: Vec<_> = entries
        .iter()
        .map(|entry| {
            let payload = serde_json::from_str::<serde_json::Value>(&entry.payload)
                .unwrap_or_else(|_| serde_json::Value::String(entry.payload.clone()));
            json!({
                "id": entry.id,
                "endpoint": entry.endpoint,
                "created_at": entry.created_at,
                "payload": payload
            })
        })
        .collect();

    let output = json!({
        "count": entries.len(),
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON serialization helper
///
/// # Errors
///
/// Returns `TickvaultError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, TickvaultError> {
    Ok(serde_json::to_string_pretty(value)?)
}
