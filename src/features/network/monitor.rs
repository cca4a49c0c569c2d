//! Connectivity tracking.
//!
//! The monitor holds the current [`NetworkStatus`], turns platform signals
//! into online/offline transitions and notifies subscribers on each
//! transition. It never performs I/O itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Coarse connection quality hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// The platform gave no hint.
    #[default]
    Unknown,
    /// Slow or lossy link.
    Poor,
    /// Normal link.
    Good,
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Poor => write!(f, "poor"),
            Self::Good => write!(f, "good"),
        }
    }
}

/// Current connectivity as seen by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Whether the platform reports connectivity.
    pub online: bool,
    /// Quality hint.
    pub quality: ConnectionQuality,
    /// When `online` last changed.
    pub last_transition_at: DateTime<Utc>,
}

/// A raw connectivity report from the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivitySignal {
    /// Reported connectivity.
    pub online: bool,
    /// Reported quality.
    pub quality: ConnectionQuality,
}

impl ConnectivitySignal {
    /// Signal that the link came up.
    #[must_use]
    pub const fn online() -> Self {
        Self {
            online: true,
            quality: ConnectionQuality::Unknown,
        }
    }

    /// Signal that the link went down.
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            online: false,
            quality: ConnectionQuality::Unknown,
        }
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&NetworkStatus) + Send + Sync>;

struct MonitorInner {
    status: Mutex<NetworkStatus>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

/// Tracks online/offline transitions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("status", &self.status())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor {
    /// Create a monitor with the given initial connectivity.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                status: Mutex::new(NetworkStatus {
                    online,
                    quality: ConnectionQuality::Unknown,
                    last_transition_at: Utc::now(),
                }),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        *self.inner.status.lock()
    }

    /// Whether the monitor currently reports connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.status.lock().online
    }

    /// Register a listener invoked on every online/offline transition.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&NetworkStatus) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Apply a platform signal.
    ///
    /// Returns the new status if connectivity changed. Quality-only changes
    /// update the hint without notifying anyone.
    pub fn report(&self, signal: ConnectivitySignal) -> Option<NetworkStatus> {
        let transitioned = {
            let mut status = self.inner.status.lock();
            status.quality = signal.quality;
            if status.online == signal.online {
                None
            } else {
                status.online = signal.online;
                status.last_transition_at = Utc::now();
                Some(*status)
            }
        };

        let status = transitioned?;
        if status.online {
            tracing::info!(quality = %status.quality, "network online");
        } else {
            tracing::info!("network offline");
        }

        // Listeners run outside the lock so they may query the monitor
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&status);
        }

        Some(status)
    }

    /// Shorthand for reporting connectivity without a quality hint.
    pub fn set_online(&self, online: bool) -> Option<NetworkStatus> {
        self.report(ConnectivitySignal {
            online,
            quality: ConnectionQuality::Unknown,
        })
    }

    /// Apply every signal from a platform stream until it ends.
    pub async fn follow<S>(&self, signals: S)
    where
        S: Stream<Item = ConnectivitySignal>,
    {
        futures::pin_mut!(signals);
        while let Some(signal) = signals.next().await {
            self.report(signal);
        }
    }
}
