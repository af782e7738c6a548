use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key   TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS control_state (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    action     TEXT NOT NULL,
    chat_id    INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    status     TEXT NOT NULL DEFAULT 'pending',
    git_head   TEXT,
    origin     TEXT NOT NULL DEFAULT 'primary',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS forward_rules (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      INTEGER NOT NULL,
    destination INTEGER NOT NULL,
    enabled     INTEGER NOT NULL DEFAULT 1,
    delay_secs  INTEGER NOT NULL DEFAULT 2,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_forward_rules_source ON forward_rules(source);
";

/// Handle to the embedded database.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Opens (or creates) the database file at `path` and applies the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        let store = Self::init(conn, Some(path))?;
        info!(path = %store.describe(), "Database opened");
        Ok(store)
    }

    /// Opens a private in-memory database. Used by tests and dry runs.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        migrate_control_origin(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Location of the database file, or `:memory:`.
    pub fn describe(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.describe())
            .finish()
    }
}

/// Databases written before identities were tracked lack `control_state.origin`.
fn migrate_control_origin(conn: &Connection) -> StorageResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(control_state)")?;
    let has_origin = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == "origin");

    if !has_origin {
        debug!("Adding origin column to control_state");
        conn.execute_batch(
            "ALTER TABLE control_state ADD COLUMN origin TEXT NOT NULL DEFAULT 'primary';",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("atlas.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.describe(), path.display().to_string());
    }

    #[test]
    fn test_legacy_control_table_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE control_state (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    action TEXT NOT NULL,
                    chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    git_head TEXT,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                );
                INSERT INTO control_state (action, chat_id, message_id) VALUES ('restart', 5, 6);",
            )
            .unwrap();
        }

        let store = Store::open(&path).unwrap();
        let pending = store.pending_action().unwrap().unwrap();
        assert_eq!(pending.chat_id, 5);
        assert_eq!(pending.origin, atlas_core::Identity::Primary);
    }
}
