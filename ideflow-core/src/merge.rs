//! Streaming k-way merge of a group's archives
//!
//! Each archive is read lazily; the merge holds at most one pending event per
//! archive, so memory is bounded by the number of archives in the group.
//!
//! Ordering key is `triggered_at`. Ties are broken by archive order (sorted
//! relative path) and then by position within the archive, so the merge is a
//! stable sort of its inputs.

use crate::archive::ArchiveReader;
use crate::types::{Archive, RawEvent};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Counters for one merged stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeStats {
    /// Events emitted in order
    pub events: usize,
    /// Events without `triggered_at`, kept aside or dropped
    pub untimed_events: usize,
    /// Events earlier than an event already emitted from the same archive
    pub out_of_order_events: usize,
    /// Records skipped by the archive readers
    pub corrupt_records: usize,
    /// Archives that could not be opened, with the reason
    pub unreadable_archives: Vec<(String, String)>,
}

struct Pending {
    time: DateTime<Utc>,
    source: usize,
    seq: u64,
    event: RawEvent,
}

impl Pending {
    fn key(&self) -> (DateTime<Utc>, usize, u64) {
        (self.time, self.source, self.seq)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Builds merged streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    retain_untimed: bool,
}

impl Merger {
    /// With `retain_untimed`, events lacking `triggered_at` are collected for
    /// [`MergedStream::take_untimed`] instead of being dropped.
    pub fn new(retain_untimed: bool) -> Self {
        Self { retain_untimed }
    }

    /// Merge the given archives. Archives that cannot be opened are logged and
    /// recorded in [`MergeStats::unreadable_archives`].
    pub fn merge(&self, archives: &[Archive]) -> MergedStream<BufReader<File>> {
        let mut sorted: Vec<&Archive> = archives.iter().collect();
        sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let mut readers = Vec::with_capacity(sorted.len());
        let mut unreadable = Vec::new();
        for archive in sorted {
            match ArchiveReader::open(archive) {
                Ok(reader) => readers.push(reader),
                Err(e) => {
                    tracing::warn!(archive = %archive.relative_path, error = %e, "Skipping unreadable archive");
                    unreadable.push((archive.relative_path.clone(), e.to_string()));
                }
            }
        }

        let mut stream = self.merge_readers(readers);
        stream.stats.unreadable_archives = unreadable;
        stream
    }

    /// Merge already-open readers, ordered by their relative paths.
    pub fn merge_readers<R: BufRead>(&self, mut readers: Vec<ArchiveReader<R>>) -> MergedStream<R> {
        readers.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
        let count = readers.len();
        let mut stream = MergedStream {
            sources: readers,
            next_seq: vec![0; count],
            last_emitted: vec![None; count],
            heap: BinaryHeap::with_capacity(count),
            retain_untimed: self.retain_untimed,
            untimed: Vec::new(),
            stats: MergeStats::default(),
        };
        for source in 0..count {
            stream.refill(source);
        }
        stream
    }
}

/// Time-ordered event stream over a group's archives.
pub struct MergedStream<R> {
    sources: Vec<ArchiveReader<R>>,
    next_seq: Vec<u64>,
    last_emitted: Vec<Option<DateTime<Utc>>>,
    heap: BinaryHeap<Reverse<Pending>>,
    retain_untimed: bool,
    untimed: Vec<RawEvent>,
    stats: MergeStats,
}

impl<R: BufRead> MergedStream<R> {
    /// Pull the next timed event of `source` into the heap.
    fn refill(&mut self, source: usize) {
        while let Some(event) = self.sources[source].next() {
            let seq = self.next_seq[source];
            self.next_seq[source] += 1;
            match event.triggered_at {
                Some(time) => {
                    self.heap.push(Reverse(Pending {
                        time,
                        source,
                        seq,
                        event,
                    }));
                    return;
                }
                None => {
                    self.stats.untimed_events += 1;
                    if self.retain_untimed {
                        self.untimed.push(event);
                    }
                }
            }
        }
    }

    /// Counters so far; complete once the stream is exhausted.
    pub fn stats(&self) -> MergeStats {
        let mut stats = self.stats.clone();
        stats.corrupt_records = self
            .sources
            .iter()
            .map(|s| s.stats().corrupt_records)
            .sum();
        stats
    }

    /// Untimed events collected so far (only with `retain_untimed`).
    pub fn take_untimed(&mut self) -> Vec<RawEvent> {
        std::mem::take(&mut self.untimed)
    }
}

impl<R: BufRead> Iterator for MergedStream<R> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        loop {
            let Reverse(pending) = self.heap.pop()?;
            self.refill(pending.source);

            let last = &mut self.last_emitted[pending.source];
            if matches!(*last, Some(prev) if pending.time < prev) {
                tracing::warn!(
                    archive = %self.sources[pending.source].relative_path(),
                    triggered_at = %pending.time,
                    "Dropping out-of-order event"
                );
                self.stats.out_of_order_events += 1;
                continue;
            }
            *last = Some(pending.time);

            self.stats.events += 1;
            return Some(pending.event);
        }
    }
}
