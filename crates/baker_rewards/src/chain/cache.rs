//! SQLite cache with content-hash keys for immutable historical chain responses.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Response cache. Key = SHA-256 of the backend label plus request path.
///
/// Level-pinned responses live under [`Cache::key_for`]. Responses that move
/// with the chain (head) are kept only as the latest copy under
/// [`Cache::latest_key_for`], for offline runs.
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create cache at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                backend TEXT NOT NULL,
                body TEXT NOT NULL,
                created_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_backend ON responses(backend);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn key_for(backend: &str, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(backend.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn latest_key_for(backend: &str, path: &str) -> String {
        Self::key_for(backend, &format!("latest:{}", path))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT body FROM responses WHERE key = ?1")?;
        let row = stmt.query_row([key], |r| r.get::<_, String>(0)).optional()?;
        Ok(row)
    }

    /// Insert or replace the body for key.
    pub fn set(&self, key: &str, backend: &str, body: &str) -> Result<(), CacheError> {
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, backend, body, created_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, backend, body, created],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn key_separates_backends() {
        let a = Cache::key_for("node", "/chains/main/blocks/100/metadata");
        let b = Cache::key_for("mirror", "/chains/main/blocks/100/metadata");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, Cache::key_for("node", "/chains/main/blocks/100/metadata"));
        assert_ne!(
            Cache::key_for("node", "/chains/main/blocks/head"),
            Cache::latest_key_for("node", "/chains/main/blocks/head")
        );
    }

    #[test]
    fn get_set() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let key = Cache::key_for("node", "/x");
        cache.set(&key, "node", r#"{"balance":"10"}"#).unwrap();
        assert_eq!(
            cache.get(&key).unwrap().as_deref(),
            Some(r#"{"balance":"10"}"#)
        );
        assert!(cache.get("nonexistent").unwrap().is_none());
    }
}
