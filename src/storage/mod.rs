//! Storage layer for tickvault.
//!
//! `SQLite` persistence for entity snapshots and the teardown outbox.

mod database;
mod migrations;
mod store;

pub use database::Database;
pub use store::{LocalStore, OutboxEntry, ReplayReport, StoredSnapshot};
