use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

use crate::store::repo::KeyValueStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection poisoned"))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS prefs (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                r#"SELECT value FROM prefs WHERE key=?1"#,
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO prefs (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_previous_value() {
        let s = SqliteStore::open_in_memory().unwrap();
        assert_eq!(s.get("columns.latest_mail").unwrap(), None);

        s.set("columns.latest_mail", r#"{"sender":20}"#).unwrap();
        s.set("columns.latest_mail", r#"{"sender":24}"#).unwrap();
        assert_eq!(
            s.get("columns.latest_mail").unwrap().as_deref(),
            Some(r#"{"sender":24}"#)
        );
    }

    #[test]
    fn survives_reopen() {
        let path = std::env::temp_dir().join(format!("mail_console_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let s = SqliteStore::open(&path).unwrap();
            s.set("k", "v").unwrap();
        }
        let s = SqliteStore::open(&path).unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
        drop(s);
        let _ = std::fs::remove_file(&path);
    }
}
