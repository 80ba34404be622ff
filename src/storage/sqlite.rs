use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use super::KvStore;
use super::schema;

pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute(schema::CREATE_KV_TABLE, [])?;
        Ok(Self { conn })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::new(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::new(conn)
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl KvStore for SqliteKvStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(schema::SELECT_KV, params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(schema::UPSERT_KV, params![key, value, now])?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn.execute(schema::DELETE_KV, params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KvStoreExt;
    use tempfile::TempDir;

    fn test_store() -> SqliteKvStore {
        SqliteKvStore::in_memory().unwrap()
    }

    #[test]
    fn test_in_memory_creates_table() {
        let store = test_store();
        let count: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'kv'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_get_missing_key() {
        let store = test_store();
        assert!(store.get_raw("nope").unwrap().is_none());
    }

    #[test]
    fn test_set_then_get() {
        let store = test_store();
        store.set_raw("k", "\"v\"").unwrap();
        assert_eq!(store.get_raw("k").unwrap().as_deref(), Some("\"v\""));
    }

    #[test]
    fn test_set_overwrites() {
        let store = test_store();
        store.set_raw("k", "1").unwrap();
        store.set_raw("k", "2").unwrap();
        assert_eq!(store.get_raw("k").unwrap().as_deref(), Some("2"));
        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_remove() {
        let store = test_store();
        store.set_raw("k", "1").unwrap();
        store.remove("k").unwrap();
        assert!(store.get_raw("k").unwrap().is_none());
    }

    #[test]
    fn test_remove_missing_ok() {
        let store = test_store();
        assert!(store.remove("ghost").is_ok());
    }

    #[test]
    fn test_json_helpers() {
        let store = test_store();
        store.set_json("flag", &true).unwrap();
        assert_eq!(store.get_json::<bool>("flag").unwrap(), Some(true));
    }

    #[test]
    fn test_open_persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        SqliteKvStore::open(&path).unwrap().set_raw("k", "1").unwrap();
        let reopened = SqliteKvStore::open(&path).unwrap();
        assert_eq!(reopened.get_raw("k").unwrap().as_deref(), Some("1"));
    }
}
