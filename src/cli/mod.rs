//! Command-line interface for tickvault.

pub mod args;
pub mod commands;
