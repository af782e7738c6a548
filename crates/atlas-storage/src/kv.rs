//! Generic string-keyed, string-valued storage.
//!
//! Keys are colon-delimited hierarchical strings such as
//! `notes:<chat_id>:<name>` or `assistant_pm:<message_id>`.

use std::fmt::Display;

use rusqlite::{OptionalExtension, params};

use crate::error::StorageResult;
use crate::store::Store;

impl Store {
    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Returns the value stored under `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: &str) -> StorageResult<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: impl Display) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    /// Removes `key`. Returns `true` if it existed.
    pub fn delete(&self, key: &str) -> StorageResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// All keys starting with `prefix`, sorted.
    pub fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite_delete() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get("log_chat_id").unwrap(), None);

        store.set("log_chat_id", -100_123).unwrap();
        store.set("log_chat_id", -100_456).unwrap();
        assert_eq!(store.get("log_chat_id").unwrap().as_deref(), Some("-100456"));

        assert!(store.delete("log_chat_id").unwrap());
        assert!(!store.delete("log_chat_id").unwrap());
        assert_eq!(store.get_or("log_chat_id", "none").unwrap(), "none");
    }

    #[test]
    fn test_keys_prefix_is_literal() {
        let store = Store::open_in_memory().unwrap();
        store.set("notes:1:a", "x").unwrap();
        store.set("notes:1:b", "y").unwrap();
        store.set("notes:10:a", "z").unwrap();
        store.set("notes_1", "w").unwrap();

        assert_eq!(
            store.keys("notes:1:").unwrap(),
            vec!["notes:1:a".to_string(), "notes:1:b".to_string()]
        );
        assert_eq!(store.keys("notes:").unwrap().len(), 3);
    }
}
