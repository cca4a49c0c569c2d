//! Network connectivity monitoring.
//!
//! Tracks online/offline transitions reported by the host platform and
//! triggers a request queue drain whenever connectivity returns.

pub mod monitor;

pub use monitor::{
    ConnectionQuality, ConnectivitySignal, NetworkMonitor, NetworkStatus, SubscriptionId,
};
