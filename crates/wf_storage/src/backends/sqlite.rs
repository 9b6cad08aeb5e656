use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use wf_core::{Error, KeyValueStore, Result};

pub const DEFAULT_FILE_NAME: &str = "wikifeed.db";
pub const DEFAULT_QUOTA: usize = 5 * 1024 * 1024;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

// Sizes are byte lengths, so they agree with `str::len` on the Rust side.
const USED_BYTES: &str =
    "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) FROM kv";
const ENTRY_BYTES: &str =
    "SELECT length(CAST(key AS BLOB)) + length(CAST(value AS BLOB)) FROM kv WHERE key = ?1";

/// Key-value store backed by a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    quota: usize,
}

fn db_error(context: &str, e: rusqlite::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

impl SqliteStore {
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_with_quota(dir, DEFAULT_QUOTA)
    }

    pub fn open_with_quota(dir: &Path, quota: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = dir.join(DEFAULT_FILE_NAME);
        let conn = Connection::open(&db_path)
            .map_err(|e| db_error("Failed to open database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            conn.execute_batch(migration)
                .map_err(|e| db_error(&format!("Failed to run migration {}", i), e))?;
        }
        debug!("Opened {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            quota,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn used(conn: &Connection) -> Result<usize> {
        let total: i64 = conn
            .query_row(USED_BYTES, [], |row| row.get(0))
            .map_err(|e| db_error("Failed to measure store", e))?;
        Ok(total.max(0) as usize)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| db_error("Failed to read key", e))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;

        let replaced: i64 = conn
            .query_row(ENTRY_BYTES, params![key], |row| row.get(0))
            .optional()
            .map_err(|e| db_error("Failed to measure key", e))?
            .unwrap_or(0);
        let needed = Self::used(&conn)?
            .saturating_sub(replaced.max(0) as usize)
            .saturating_add(key.len() + value.len());
        if needed > self.quota {
            return Err(Error::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }

        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| db_error("Failed to write key", e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| db_error("Failed to delete key", e))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv ORDER BY key")
            .map_err(|e| db_error("Failed to list keys", e))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| db_error("Failed to list keys", e))?;
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<usize> {
        let conn = self.conn()?;
        Self::used(&conn)
    }
}
