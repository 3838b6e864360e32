//! Identifier extraction with a persistent, content-validated cache.

use super::reader::ArchiveReader;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{Archive, EventPayload, Identifier, RawEvent};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;

/// How an extraction was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Cached entry matched the archive's content hash
    Hit,
    /// No entry, or a stale one; the archive was scanned
    Miss,
    /// No cache configured; the archive was scanned
    Disabled,
}

/// Identifiers extracted from one archive.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub identifiers: BTreeSet<Identifier>,
    pub outcome: CacheOutcome,
}

/// Add the identifiers carried by `event` to `out`.
pub fn collect_identifiers(event: &RawEvent, out: &mut BTreeSet<Identifier>) {
    if !event.session_id.is_empty() {
        out.insert(event.session_id.clone());
    }
    if let EventPayload::UserProfile { profile_id } = &event.payload {
        if !profile_id.is_empty() {
            out.insert(profile_id.clone());
        }
    }
}

/// Scan every event of an archive for identifiers.
///
/// Corrupt records are skipped. An I/O error while reading is returned, since
/// a partial identifier set would silently split a user's archives.
pub fn scan_identifiers<R: BufRead>(
    mut reader: ArchiveReader<R>,
) -> Result<BTreeSet<Identifier>> {
    let mut identifiers = BTreeSet::new();
    for event in reader.by_ref() {
        collect_identifiers(&event, &mut identifiers);
    }
    if reader.stats().read_errors > 0 {
        return Err(Error::archive(reader.relative_path(), "read error while scanning"));
    }
    Ok(identifiers)
}

/// SHA-256 of a file's bytes, hex encoded.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Extracts identifiers from archives under one root, consulting the cache.
///
/// Shareable across worker threads: the cache serializes access internally and
/// every entry is keyed by a distinct archive path.
pub struct IdentifierExtractor<'a> {
    archive_root: String,
    db: Option<&'a Database>,
}

impl<'a> IdentifierExtractor<'a> {
    /// `db = None` disables caching.
    pub fn new(archive_root: &Path, db: Option<&'a Database>) -> Self {
        let archive_root = archive_root
            .canonicalize()
            .unwrap_or_else(|_| archive_root.to_path_buf())
            .to_string_lossy()
            .to_string();
        Self { archive_root, db }
    }

    /// Cache key for the archive root
    pub fn archive_root(&self) -> &str {
        &self.archive_root
    }

    /// Identifiers of one archive.
    ///
    /// Fails if the archive cannot be opened or read; cache errors are logged
    /// and treated as misses.
    pub fn extract(&self, archive: &Archive) -> Result<Extraction> {
        let Some(db) = self.db else {
            let identifiers = scan_identifiers(ArchiveReader::open(archive)?)?;
            return Ok(Extraction {
                identifiers,
                outcome: CacheOutcome::Disabled,
            });
        };

        let hash = content_hash(&archive.path)
            .map_err(|e| Error::archive(archive.relative_path.as_str(), e))?;

        match db.get_cached_identifiers(&self.archive_root, &archive.relative_path) {
            Ok(Some(cached)) if cached.content_hash == hash => {
                tracing::debug!(archive = %archive.relative_path, cache_hit = true, "Identifier cache hit");
                return Ok(Extraction {
                    identifiers: cached.identifiers,
                    outcome: CacheOutcome::Hit,
                });
            }
            Ok(Some(_)) => {
                tracing::debug!(archive = %archive.relative_path, "Archive changed, cache entry is stale");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(archive = %archive.relative_path, error = %e, "Identifier cache lookup failed");
            }
        }

        let identifiers = scan_identifiers(ArchiveReader::open(archive)?)?;

        if let Err(e) =
            db.put_cached_identifiers(&self.archive_root, &archive.relative_path, &hash, &identifiers)
        {
            tracing::warn!(archive = %archive.relative_path, error = %e, "Failed to update identifier cache");
        }

        tracing::debug!(
            archive = %archive.relative_path,
            cache_hit = false,
            identifiers = identifiers.len(),
            "Scanned archive for identifiers"
        );

        Ok(Extraction {
            identifiers,
            outcome: CacheOutcome::Miss,
        })
    }
}
