//! Namespaced key/value store shared by the queue, cache, and conflict registry.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::Database;
use crate::error::Result;

/// The four independent namespaces of the local store.
///
/// Keys never collide across namespaces, even when identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
    /// Read cache of remote collections
    Cache,
    /// Pending write operations
    Queue,
    /// File bodies staged for deferred upload
    Uploads,
    /// Detected conflicts awaiting manual resolution
    Conflicts,
}

impl StoreName {
    /// Stable name persisted in the `store` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Uploads => "uploads",
            Self::Conflicts => "conflicts",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe handle to the durable local store.
///
/// Cloning is cheap; all clones share one connection. `SQLite` calls run inline
/// on the calling task while the connection lock is held, which suits the
/// client's single cooperative task and its small per-key reads and writes.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open the store at the given filesystem path, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(path)?;
        tracing::debug!("Opened local store at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Fetch the raw value for `key`, or `None` when absent.
    pub async fn get(&self, store: StoreName, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.lock().await;
        let value = db
            .connection()
            .query_row(
                "SELECT value FROM kv_entries WHERE store = ? AND key = ?",
                params![store.as_str(), key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace the raw value for `key`.
    pub async fn set(&self, store: StoreName, key: &str, value: &[u8]) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO kv_entries (store, key, value) VALUES (?, ?, ?)
             ON CONFLICT(store, key) DO UPDATE SET value = excluded.value",
            params![store.as_str(), key, value],
        )?;
        Ok(())
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub async fn remove(&self, store: StoreName, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM kv_entries WHERE store = ? AND key = ?",
            params![store.as_str(), key],
        )?;
        Ok(())
    }

    /// Visit every entry of a namespace as `(value, key)`.
    ///
    /// Iteration order is unspecified.
    pub async fn iterate<F>(&self, store: StoreName, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &str),
    {
        let db = self.db.lock().await;
        let mut stmt = db
            .connection()
            .prepare("SELECT key, value FROM kv_entries WHERE store = ?")?;
        let mut rows = stmt.query(params![store.as_str()])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(&value, &key);
        }
        Ok(())
    }

    /// Number of entries in a namespace.
    pub async fn count(&self, store: StoreName) -> Result<usize> {
        let db = self.db.lock().await;
        let count: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM kv_entries WHERE store = ?",
            params![store.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Fetch and decode a JSON value.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        store: StoreName,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(store, key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a JSON value.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        store: StoreName,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(store, key, &bytes).await
    }

    /// Raw `(key, value)` pairs of a namespace.
    pub async fn entries(&self, store: StoreName) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();
        self.iterate(store, |value, key| entries.push((key.to_string(), value.to_vec())))
            .await?;
        Ok(entries)
    }

    /// Decode every JSON value of a namespace.
    ///
    /// Fails on the first entry that does not decode as `T`.
    pub async fn values_json<T: DeserializeOwned>(&self, store: StoreName) -> Result<Vec<T>> {
        let mut raw = Vec::new();
        self.iterate(store, |value, _key| raw.push(value.to_vec()))
            .await?;

        raw.iter()
            .map(|bytes| -> Result<T> { Ok(serde_json::from_slice(bytes)?) })
            .collect()
    }
}
