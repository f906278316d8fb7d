//! Document repository implementation

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{DocumentKey, EntityType, LocalDocument};
use crate::util::unix_timestamp_millis;

/// Outcome of applying a remote record during a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApplyOutcome {
    /// The remote record was upserted into the store
    Applied(DocumentKey),
    /// A pending local edit exists for the key; the remote copy was not applied
    SkippedPendingEdit(DocumentKey),
}

/// Trait for local document storage operations
pub trait DocumentRepository {
    /// Upsert a local write; sets `synced=false` in the same statement
    /// so payload and status commit atomically
    fn upsert_local(&self, doc: &LocalDocument) -> Result<()>;

    /// Apply a remote record, unless a pending local edit shadows it
    fn apply_remote(
        &self,
        entity_type: EntityType,
        remote_id: &str,
        payload: &Value,
        owner_id: &str,
    ) -> Result<RemoteApplyOutcome>;

    /// Get a document by local or remote id (tombstones excluded)
    fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>>;

    /// List all documents of one type (tombstones excluded)
    fn list(&self, entity_type: EntityType) -> Result<Vec<LocalDocument>>;

    /// Scan the outbox: every `synced=false` document across all types,
    /// in local modification order
    fn list_unsynced(&self) -> Result<Vec<LocalDocument>>;

    /// Record a push acknowledgment for a document. The ack only covers
    /// the payload read at scan time: when the row has been rewritten
    /// since `scanned_at`, it stays pending and `false` is returned.
    fn mark_synced(&self, key: &DocumentKey, remote_id: &str, scanned_at: i64) -> Result<bool>;

    /// Delete a document. Returns the tombstone when a remote delete
    /// still has to be pushed, `None` when the document was removed
    /// outright (it never existed remotely).
    fn delete(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>>;

    /// Physically remove a row (after the remote delete is acknowledged),
    /// unless it has been rewritten since `scanned_at`.
    fn remove(&self, key: &DocumentKey, scanned_at: i64) -> Result<bool>;
}

/// `SQLite` implementation of `DocumentRepository`
pub struct SqliteDocumentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDocumentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Look a row up by either its local key or its remote id.
    fn find(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>> {
        self.conn
            .query_row(
                "SELECT entity_type, entity_id, remote_id, owner_id, payload,
                        synced, deleted, last_modified_locally
                 FROM documents
                 WHERE entity_type = ? AND (entity_id = ? OR remote_id = ?)",
                params![entity_type.as_str(), id, id],
                Self::parse_document,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Parse a document from a database row
    fn parse_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalDocument> {
        let entity_type: String = row.get(0)?;
        let entity_type = entity_type.parse::<EntityType>().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                "unknown entity type".into(),
            )
        })?;

        Ok(LocalDocument {
            key: DocumentKey::new(entity_type, row.get::<_, String>(1)?),
            remote_id: row.get(2)?,
            owner_id: row.get(3)?,
            payload: row.get(4)?,
            synced: row.get::<_, i32>(5)? != 0,
            deleted: row.get::<_, i32>(6)? != 0,
            last_modified_locally: row.get(7)?,
        })
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn upsert_local(&self, doc: &LocalDocument) -> Result<()> {
        // owner_id and any known remote_id survive overwrites; a local
        // edit must not turn an update push back into a create.
        self.conn.execute(
            "INSERT INTO documents
                (entity_type, entity_id, remote_id, owner_id, payload,
                 synced, deleted, last_modified_locally)
             VALUES (?, ?, ?, ?, ?, 0, 0, ?)
             ON CONFLICT (entity_type, entity_id) DO UPDATE SET
                payload = excluded.payload,
                remote_id = COALESCE(documents.remote_id, excluded.remote_id),
                synced = 0,
                deleted = 0,
                last_modified_locally = excluded.last_modified_locally",
            params![
                doc.key.entity_type.as_str(),
                doc.key.entity_id,
                doc.remote_id,
                doc.owner_id,
                doc.payload,
                doc.last_modified_locally,
            ],
        )?;

        Ok(())
    }

    fn apply_remote(
        &self,
        entity_type: EntityType,
        remote_id: &str,
        payload: &Value,
        owner_id: &str,
    ) -> Result<RemoteApplyOutcome> {
        match self.find(entity_type, remote_id)? {
            // A pending local write (edit or tombstone) takes precedence
            // until it has been pushed.
            Some(existing) if !existing.synced => {
                Ok(RemoteApplyOutcome::SkippedPendingEdit(existing.key))
            }
            Some(existing) => {
                self.conn.execute(
                    "UPDATE documents
                     SET payload = ?, remote_id = ?, synced = 1
                     WHERE entity_type = ? AND entity_id = ?",
                    params![
                        payload,
                        remote_id,
                        entity_type.as_str(),
                        existing.key.entity_id
                    ],
                )?;
                Ok(RemoteApplyOutcome::Applied(existing.key))
            }
            None => {
                let key = DocumentKey::new(entity_type, remote_id);
                self.conn.execute(
                    "INSERT INTO documents
                        (entity_type, entity_id, remote_id, owner_id, payload,
                         synced, deleted, last_modified_locally)
                     VALUES (?, ?, ?, ?, ?, 1, 0, ?)",
                    params![
                        entity_type.as_str(),
                        remote_id,
                        remote_id,
                        owner_id,
                        payload,
                        unix_timestamp_millis(),
                    ],
                )?;
                Ok(RemoteApplyOutcome::Applied(key))
            }
        }
    }

    fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>> {
        Ok(self.find(entity_type, id)?.filter(|doc| !doc.deleted))
    }

    fn list(&self, entity_type: EntityType) -> Result<Vec<LocalDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_type, entity_id, remote_id, owner_id, payload,
                    synced, deleted, last_modified_locally
             FROM documents
             WHERE entity_type = ? AND deleted = 0
             ORDER BY last_modified_locally",
        )?;

        let docs = stmt
            .query_map(params![entity_type.as_str()], Self::parse_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    fn list_unsynced(&self) -> Result<Vec<LocalDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_type, entity_id, remote_id, owner_id, payload,
                    synced, deleted, last_modified_locally
             FROM documents
             WHERE synced = 0
             ORDER BY last_modified_locally",
        )?;

        let docs = stmt
            .query_map([], Self::parse_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    fn mark_synced(&self, key: &DocumentKey, remote_id: &str, scanned_at: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE documents SET synced = 1, remote_id = ?
             WHERE entity_type = ? AND entity_id = ? AND last_modified_locally = ?",
            params![
                remote_id,
                key.entity_type.as_str(),
                key.entity_id,
                scanned_at
            ],
        )?;
        if rows == 1 {
            return Ok(true);
        }

        // The row was rewritten after the outbox scan, so the ack only
        // covers a stale payload. The row stays pending; the remote id
        // is still recorded so the next push is an update, not a
        // second create.
        let rows = self.conn.execute(
            "UPDATE documents SET remote_id = COALESCE(remote_id, ?)
             WHERE entity_type = ? AND entity_id = ?",
            params![remote_id, key.entity_type.as_str(), key.entity_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(key.to_string()));
        }

        Ok(false)
    }

    fn delete(&self, entity_type: EntityType, id: &str) -> Result<Option<LocalDocument>> {
        let Some(doc) = self.find(entity_type, id)? else {
            return Err(Error::NotFound(format!("{entity_type}/{id}")));
        };

        if doc.remote_id.is_none() && !doc.synced {
            // Never pushed: no remote counterpart exists, remove outright.
            self.remove(&doc.key, doc.last_modified_locally)?;
            return Ok(None);
        }

        let now = unix_timestamp_millis();
        self.conn.execute(
            "UPDATE documents SET deleted = 1, synced = 0, last_modified_locally = ?
             WHERE entity_type = ? AND entity_id = ?",
            params![now, doc.key.entity_type.as_str(), doc.key.entity_id],
        )?;

        Ok(Some(LocalDocument {
            synced: false,
            deleted: true,
            last_modified_locally: now,
            ..doc
        }))
    }

    fn remove(&self, key: &DocumentKey, scanned_at: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM documents
             WHERE entity_type = ? AND entity_id = ? AND last_modified_locally = ?",
            params![key.entity_type.as_str(), key.entity_id, scanned_at],
        )?;

        Ok(rows == 1)
    }
}
