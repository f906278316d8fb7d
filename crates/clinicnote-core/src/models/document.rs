//! Local document model
//!
//! A `LocalDocument` is the unit of storage and synchronization: one
//! entity payload plus the metadata the sync engine needs to decide
//! what still has to be pushed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityType;

/// Composite key identifying a document within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl DocumentKey {
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A locally persisted record and its sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDocument {
    /// Unique key within the store
    pub key: DocumentKey,
    /// Id assigned by the remote authority, once known.
    ///
    /// `None` means the document has never been created remotely, so
    /// the next push must be a create rather than an update.
    pub remote_id: Option<String>,
    /// User the record belongs to; never changes after creation
    pub owner_id: String,
    /// Domain fields, opaque to the engine
    pub payload: Value,
    /// `true` when local and remote are believed identical
    pub synced: bool,
    /// Tombstone flag: deleted locally, remote delete not yet acknowledged
    pub deleted: bool,
    /// Timestamp of last local write (Unix ms), used for outbox ordering
    pub last_modified_locally: i64,
}

impl LocalDocument {
    /// Whether this document is part of the outbox (awaiting push).
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.synced
    }
}

/// Notification published on every local store mutation.
///
/// Consumed by UI layers and diagnostics; not required for sync
/// correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A local write created or updated a document
    Saved(DocumentKey),
    /// A document was deleted or tombstoned locally
    Deleted(DocumentKey),
    /// A pull applied a remote record into the store
    RemoteApplied(DocumentKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = DocumentKey::new(EntityType::Appointment, "a1");
        assert_eq!(key.to_string(), "appointment/a1");
    }

    #[test]
    fn test_pending_tracks_synced_flag() {
        let doc = LocalDocument {
            key: DocumentKey::new(EntityType::Clinic, "c1"),
            remote_id: None,
            owner_id: "u1".to_string(),
            payload: serde_json::json!({"hospital_name": "General"}),
            synced: false,
            deleted: false,
            last_modified_locally: 0,
        };
        assert!(doc.is_pending());
    }
}
