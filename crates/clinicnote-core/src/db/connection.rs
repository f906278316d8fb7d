//! Database connection management

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::Result;

use super::migrations;

/// Database wrapper for the local `SQLite` store.
///
/// The store is namespaced per user: two users on the same device get
/// separate database files and never share documents.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the store for the given user inside `data_dir`, creating
    /// the file if it doesn't exist. Runs migrations automatically.
    pub fn open(data_dir: impl AsRef<Path>, user_id: &str) -> Result<Self> {
        let path = Self::store_path(data_dir.as_ref(), user_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let database = Self { conn };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Database file path for a user's storage namespace.
    fn store_path(data_dir: &Path, user_id: &str) -> Result<PathBuf> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "user id for storage namespace cannot be empty".to_string(),
            ));
        }
        Ok(data_dir.join(format!("clinicnote-{user_id}.db")))
    }

    /// Configure `SQLite` for durability and concurrency.
    fn configure(&self) -> Result<()> {
        // WAL keeps readers unblocked during sync writes; not available
        // for in-memory databases, so failures are ignored.
        self.conn.pragma_update(None, "journal_mode", "WAL").ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL").ok();
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_creates_namespaced_file() {
        let dir = tempdir().unwrap();
        let _db = Database::open(dir.path(), "user-1").unwrap();
        assert!(dir.path().join("clinicnote-user-1.db").exists());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = tempdir().unwrap();
        let _a = Database::open(dir.path(), "alice").unwrap();
        let _b = Database::open(dir.path(), "bob").unwrap();
        assert!(dir.path().join("clinicnote-alice.db").exists());
        assert!(dir.path().join("clinicnote-bob.db").exists());
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let dir = tempdir().unwrap();
        assert!(Database::open(dir.path(), "  ").is_err());
    }
}
