//! Archive discovery and reading
//!
//! An archive is a JSONL file of [`RawEvent`](crate::types::RawEvent)s written
//! by the capture side. This module finds archives under a root directory,
//! streams their events lazily, and extracts correlation identifiers.
//!
//! ## Design Principles
//!
//! 1. **Read-only**: archives are never modified
//! 2. **Resilience**: a corrupt record is skipped, not fatal to its archive
//! 3. **Lazy**: events are read one at a time so memory stays bounded

pub mod identifiers;
pub mod reader;

pub use identifiers::{content_hash, CacheOutcome, Extraction, IdentifierExtractor};
pub use reader::{ArchiveReader, ReaderStats};

use crate::error::{Error, Result};
use crate::types::Archive;
use std::path::{Component, Path};

/// Find every archive under `root` matching `pattern`.
///
/// Returns archives sorted by relative path, which fixes the input order used
/// for tie-breaking everywhere downstream. Fails only if the root itself is
/// unreadable.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<Archive>> {
    std::fs::read_dir(root)
        .map_err(|e| Error::InputRoot(format!("{}: {}", root.display(), e)))?;

    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), pattern);

    let entries = glob::glob(&full_pattern)
        .map_err(|e| Error::Config(format!("invalid archive pattern '{}': {}", pattern, e)))?;

    let mut archives = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable path during discovery");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(relative_path) = relative_path(root, &path) else {
            continue;
        };
        archives.push(Archive {
            relative_path,
            path,
        });
    }

    archives.sort();
    archives.dedup_by(|a, b| a.relative_path == b.relative_path);

    tracing::debug!(root = %root.display(), count = archives.len(), "Discovered archives");
    Ok(archives)
}

/// Path of `path` relative to `root`, always with `/` separators.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
