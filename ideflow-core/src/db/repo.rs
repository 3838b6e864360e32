//! Database repository layer
//!
//! Lookup and refresh operations for the archive identifier cache.

use crate::error::{Error, Result};
use crate::types::Identifier;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

/// A cache entry: the identifiers seen in an archive at a given content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentifiers {
    pub content_hash: String,
    pub identifiers: BTreeSet<Identifier>,
}

/// Database handle (single connection, shared across workers)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Identifier cache
    // ============================================

    /// Get the cached identifiers for an archive, if any.
    ///
    /// The caller decides whether the entry is still valid by comparing
    /// `content_hash` with the archive's current hash.
    pub fn get_cached_identifiers(
        &self,
        archive_root: &str,
        archive_path: &str,
    ) -> Result<Option<CachedIdentifiers>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                r#"
                SELECT content_hash, identifiers FROM archive_identifiers
                WHERE archive_root = ?1 AND archive_path = ?2
                "#,
                params![archive_root, archive_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((content_hash, identifiers_json)) => {
                let identifiers: BTreeSet<Identifier> = serde_json::from_str(&identifiers_json)?;
                Ok(Some(CachedIdentifiers {
                    content_hash,
                    identifiers,
                }))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the cache entry for an archive
    pub fn put_cached_identifiers(
        &self,
        archive_root: &str,
        archive_path: &str,
        content_hash: &str,
        identifiers: &BTreeSet<Identifier>,
    ) -> Result<()> {
        let identifiers_json = serde_json::to_string(identifiers)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO archive_identifiers
                (archive_root, archive_path, content_hash, identifiers, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(archive_root, archive_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                identifiers = excluded.identifiers,
                updated_at = excluded.updated_at
            "#,
            params![
                archive_root,
                archive_path,
                content_hash,
                identifiers_json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove every cache entry for an archive root. Returns the number removed.
    pub fn clear_identifier_cache(&self, archive_root: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM archive_identifiers WHERE archive_root = ?1",
            [archive_root],
        )?;
        Ok(removed)
    }

    /// Number of cache entries for an archive root
    pub fn identifier_cache_len(&self, archive_root: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM archive_identifiers WHERE archive_root = ?1",
            [archive_root],
            |r| r.get(0),
        )?;
        usize::try_from(count).map_err(|e| Error::Config(format!("invalid cache count: {e}")))
    }
}
