//! Local document store service
//!
//! Async facade over the `SQLite`-backed repository, shared between the
//! UI-facing write path and the sync engine. Every mutation is
//! committed locally before the call returns and fires a change
//! notification; nothing here talks to the network.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{Database, DocumentRepository, RemoteApplyOutcome, SqliteDocumentRepository};
use crate::error::Result;
use crate::models::{ChangeEvent, DocumentKey, EntityType, LocalDocument};
use crate::notifier::ChangeNotifier;
use crate::util::unix_timestamp_millis;

/// Thread-safe, per-call-atomic document store for one user's namespace.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Mutex<Database>>,
    notifier: ChangeNotifier,
    owner_id: String,
}

impl DocumentStore {
    /// Open the store for `user_id` inside `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>, user_id: &str) -> Result<Self> {
        let db = Database::open(data_dir, user_id)?;
        Ok(Self::from_database(db, user_id))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory(user_id: &str) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db, user_id))
    }

    fn from_database(db: Database, user_id: &str) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            notifier: ChangeNotifier::new(),
            owner_id: user_id.to_string(),
        }
    }

    /// Subscribe to change notifications for this store.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    /// Persist a local write. Derives the entity id from the payload's
    /// `id` field when present, otherwise assigns one. The document is
    /// committed with `synced=false` in a single statement.
    pub async fn save(&self, entity_type: EntityType, payload: Value) -> Result<LocalDocument> {
        let entity_id = derive_entity_id(&payload);
        let doc = LocalDocument {
            key: DocumentKey::new(entity_type, entity_id),
            remote_id: None,
            owner_id: self.owner_id.clone(),
            payload,
            synced: false,
            deleted: false,
            last_modified_locally: unix_timestamp_millis(),
        };

        {
            let db = self.db.lock().await;
            let repo = SqliteDocumentRepository::new(db.connection());
            repo.upsert_local(&doc)?;
        }

        self.notifier.publish(ChangeEvent::Saved(doc.key.clone()));
        Ok(doc)
    }

    /// Fetch a document by id (local key or remote id).
    pub async fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>> {
        let db = self.db.lock().await;
        let repo = SqliteDocumentRepository::new(db.connection());
        repo.get(entity_type, id)
    }

    /// List all documents of one type. A fresh read each call.
    pub async fn get_all(&self, entity_type: EntityType) -> Result<Vec<LocalDocument>> {
        let db = self.db.lock().await;
        let repo = SqliteDocumentRepository::new(db.connection());
        repo.list(entity_type)
    }

    /// Delete a document. Returns the tombstone when a remote delete is
    /// still owed, `None` when the document never existed remotely.
    pub async fn delete(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<LocalDocument>> {
        let tombstone = {
            let db = self.db.lock().await;
            let repo = SqliteDocumentRepository::new(db.connection());
            repo.delete(entity_type, id)?
        };

        let key = tombstone.as_ref().map_or_else(
            || DocumentKey::new(entity_type, id),
            |doc| doc.key.clone(),
        );
        self.notifier.publish(ChangeEvent::Deleted(key));
        Ok(tombstone)
    }

    /// Accept-remote upsert used by the pull phase. A pending local
    /// edit suppresses the remote copy.
    pub async fn apply_remote(
        &self,
        entity_type: EntityType,
        remote_id: &str,
        payload: &Value,
    ) -> Result<RemoteApplyOutcome> {
        let outcome = {
            let db = self.db.lock().await;
            let repo = SqliteDocumentRepository::new(db.connection());
            repo.apply_remote(entity_type, remote_id, payload, &self.owner_id)?
        };

        if let RemoteApplyOutcome::Applied(key) = &outcome {
            self.notifier.publish(ChangeEvent::RemoteApplied(key.clone()));
        }
        Ok(outcome)
    }

    /// Scan the outbox in local modification order.
    pub async fn list_unsynced(&self) -> Result<Vec<LocalDocument>> {
        let db = self.db.lock().await;
        let repo = SqliteDocumentRepository::new(db.connection());
        repo.list_unsynced()
    }

    /// Record a push acknowledgment. `scanned_at` is the modification
    /// timestamp read at outbox-scan time; when the document has been
    /// rewritten since, it stays in the outbox and `false` is returned.
    pub async fn mark_synced(
        &self,
        key: &DocumentKey,
        remote_id: &str,
        scanned_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = SqliteDocumentRepository::new(db.connection());
        repo.mark_synced(key, remote_id, scanned_at)
    }

    /// Physically remove a tombstone once its remote delete is
    /// acknowledged, unless the document was rewritten since the scan.
    pub async fn remove(&self, key: &DocumentKey, scanned_at: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = SqliteDocumentRepository::new(db.connection());
        repo.remove(key, scanned_at)
    }
}

/// Entity id from the payload's `id` field, or a fresh UUIDv7.
fn derive_entity_id(payload: &Value) -> String {
    match payload.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => Uuid::now_v7().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> DocumentStore {
        DocumentStore::open_in_memory("u1").unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_derives_id_from_payload() {
        let store = setup();

        let doc = store
            .save(EntityType::Appointment, json!({"id": "a1", "date": "2025-03-01"}))
            .await
            .unwrap();
        assert_eq!(doc.key.entity_id, "a1");

        let fetched = store.get(EntityType::Appointment, "a1").await.unwrap().unwrap();
        assert_eq!(fetched.payload, json!({"id": "a1", "date": "2025-03-01"}));
        assert!(!fetched.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_assigns_id_when_missing() {
        let store = setup();

        let doc = store
            .save(EntityType::Memo, json!({"body": "call pharmacy"}))
            .await
            .unwrap();
        assert!(!doc.key.entity_id.is_empty());
        assert!(doc.remote_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_twice_upserts_in_place() {
        let store = setup();

        store
            .save(EntityType::Clinic, json!({"id": "c1", "hospital_name": "A"}))
            .await
            .unwrap();
        store
            .save(EntityType::Clinic, json!({"id": "c1", "hospital_name": "B"}))
            .await
            .unwrap();

        let all = store.get_all(EntityType::Clinic).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload["hospital_name"], "B");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_stamps_owner() {
        let store = setup();

        let doc = store.save(EntityType::Memo, json!({})).await.unwrap();
        assert_eq!(doc.owner_id, "u1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_fires_change_notification() {
        let store = setup();
        let mut rx = store.subscribe();

        let doc = store
            .save(EntityType::Memo, json!({"id": "m1"}))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ChangeEvent::Saved(doc.key));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_never_pushed_skips_tombstone() {
        let store = setup();

        store
            .save(EntityType::Memo, json!({"id": "m1"}))
            .await
            .unwrap();
        let tombstone = store.delete(EntityType::Memo, "m1").await.unwrap();

        assert!(tombstone.is_none());
        assert!(store.get(EntityType::Memo, "m1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_pulled_doc_leaves_tombstone() {
        let store = setup();

        store
            .apply_remote(EntityType::Clinic, "c1", &json!({"hospital_name": "A"}))
            .await
            .unwrap();
        let tombstone = store.delete(EntityType::Clinic, "c1").await.unwrap().unwrap();

        assert!(tombstone.deleted);
        assert_eq!(tombstone.remote_id.as_deref(), Some("c1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_all_excludes_tombstones() {
        let store = setup();

        store
            .apply_remote(EntityType::Clinic, "c1", &json!({"hospital_name": "A"}))
            .await
            .unwrap();
        store
            .apply_remote(EntityType::Clinic, "c2", &json!({"hospital_name": "B"}))
            .await
            .unwrap();
        store.delete(EntityType::Clinic, "c1").await.unwrap();

        let all = store.get_all(EntityType::Clinic).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key.entity_id, "c2");
    }
}
