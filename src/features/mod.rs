//! Feature implementations for tickvault.
//!
//! - Network monitoring
//! - Retrying, queued persistence
//! - The single active timer and its sync coordinator

pub mod network;
pub mod sync;
pub mod timer;
