//! Teardown outbox inspection and replay.

use crate::cli::args::OutputFormat;
use crate::error::TickvaultError;
use crate::output::{format_outbox, format_replay};
use crate::storage::LocalStore;

/// List pending teardown deliveries, or apply them with `replay`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn outbox(store: &LocalStore, replay: bool, format: OutputFormat) -> Result<String, TickvaultError> {
    if replay {
        let report = store.replay_outbox()?;
        return format_replay(&report, format);
    }
    format_outbox(&store.outbox()?, format)
}
