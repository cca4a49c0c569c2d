//! Command implementations for tickvault.
//!
//! Each command returns the text to print on stdout.

mod outbox;
mod settings;
mod start;
mod status;
mod stop;

pub use outbox::outbox;
pub use settings::config;
pub use start::{mode_from_arg, start, RunEnd, RunSummary};
pub use status::status;
pub use stop::stop;
