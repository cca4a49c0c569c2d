//! tickvault - a durable single active timer
//!
//! This crate times one entity at a time and keeps its value durable across
//! network failures, app restarts and process teardown. Snapshot writes go
//! through a retry executor with exponential backoff, fall back to an
//! in-memory request queue while offline, and are replayed when
//! connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod remote;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::TickvaultError;
pub use features::timer::TimerService;
pub use storage::LocalStore;
