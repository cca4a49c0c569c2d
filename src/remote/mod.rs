//! Collaborators that move snapshots off the device.
//!
//! The timer core never performs I/O itself. A [`PersistenceClient`] writes a
//! snapshot to the durable store and reports failures as [`SyncFailure`]s for
//! the retry executor to classify; a [`TeardownDelivery`] hands a final
//! payload to a transport that outlives the process.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::SyncFailure;
use crate::features::timer::{EntitySnapshot, SnapshotFields};

/// Writes entity snapshots to the durable store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Persist the latest fields for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncFailure`] describing the transport or status failure.
    async fn persist_entity_snapshot(
        &self,
        entity_id: &str,
        fields: &SnapshotFields,
    ) -> Result<(), SyncFailure>;
}

/// Fire-and-forget delivery used while the process is going away.
#[cfg_attr(test, automock)]
pub trait TeardownDelivery: Send + Sync {
    /// Hand off `payload` for `endpoint` without waiting on the network.
    ///
    /// Returns true if the payload was accepted for delivery.
    fn send(&self, endpoint: &str, payload: &[u8]) -> bool;
}

/// Body sent through [`TeardownDelivery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownPayload {
    /// Entity the snapshot belongs to.
    pub entity_id: String,
    /// Snapshot fields.
    #[serde(flatten)]
    pub fields: SnapshotFields,
}

impl From<EntitySnapshot> for TeardownPayload {
    fn from(snapshot: EntitySnapshot) -> Self {
        Self {
            entity_id: snapshot.entity_id,
            fields: snapshot.fields,
        }
    }
}

impl TeardownPayload {
    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
