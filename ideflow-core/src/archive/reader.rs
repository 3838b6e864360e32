//! Lazy, sequential reader over one archive.

use crate::error::{Error, Result};
use crate::types::{Archive, RawEvent};
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Counters collected while reading one archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Records successfully deserialized
    pub records: usize,
    /// Records skipped because they failed to deserialize
    pub corrupt_records: usize,
    /// I/O errors; the first one ends the stream
    pub read_errors: usize,
}

/// Iterator over the events of one archive, in file order.
///
/// Blank lines are ignored. A line that does not deserialize is skipped with a
/// warning. An I/O error ends iteration.
pub struct ArchiveReader<R> {
    reader: R,
    relative_path: String,
    line: usize,
    buf: Vec<u8>,
    stats: ReaderStats,
    finished: bool,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive file for reading
    pub fn open(archive: &Archive) -> Result<Self> {
        let file = File::open(&archive.path)
            .map_err(|e| Error::archive(archive.relative_path.as_str(), e))?;
        Ok(Self::new(
            BufReader::new(file),
            archive.relative_path.clone(),
        ))
    }
}

impl<R: BufRead> ArchiveReader<R> {
    pub fn new(reader: R, relative_path: impl Into<String>) -> Self {
        Self {
            reader,
            relative_path: relative_path.into(),
            line: 0,
            buf: Vec::new(),
            stats: ReaderStats::default(),
            finished: false,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }
}

impl<R: BufRead> Iterator for ArchiveReader<R> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        archive = %self.relative_path,
                        line = self.line + 1,
                        error = %e,
                        "Read error, ending archive"
                    );
                    self.stats.read_errors += 1;
                    self.finished = true;
                    break;
                }
            }
            self.line += 1;

            let record = trim_whitespace(&self.buf);
            if record.is_empty() {
                continue;
            }

            match serde_json::from_slice::<RawEvent>(record) {
                Ok(event) => {
                    self.stats.records += 1;
                    return Some(event);
                }
                Err(e) => {
                    tracing::warn!(
                        archive = %self.relative_path,
                        line = self.line,
                        error = %e,
                        "Skipping corrupt record"
                    );
                    self.stats.corrupt_records += 1;
                }
            }
        }
        None
    }
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}
