//! Simple per-event cleanup filters.

use super::commands::is_nameless;
use super::CleanupFilter;
use crate::config::CleanupConfig;
use crate::types::{EventPayload, RawEvent};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Drops events without `triggered_at` and normalizes end times.
///
/// A missing `terminated_at` becomes `triggered_at`. Edit events always get
/// `terminated_at = triggered_at`: their recorded end is a flush time.
#[derive(Debug, Default)]
pub struct TimeDataFixer;

impl CleanupFilter for TimeDataFixer {
    fn name(&self) -> &str {
        "fix time data"
    }

    fn process(&mut self, mut event: RawEvent) -> Vec<RawEvent> {
        let Some(triggered_at) = event.triggered_at else {
            return vec![];
        };
        if event.terminated_at.is_none() || matches!(event.payload, EventPayload::Edit { .. }) {
            event.terminated_at = Some(triggered_at);
        }
        vec![event]
    }
}

/// Removes administrative noise: configured kinds, nameless and configured commands.
#[derive(Debug)]
pub struct NoiseFilter {
    dropped_kinds: HashSet<String>,
    dropped_commands: HashSet<String>,
    drop_nameless_commands: bool,
}

impl NoiseFilter {
    pub fn from_config(config: &CleanupConfig) -> Self {
        Self {
            dropped_kinds: config.dropped_kinds.iter().cloned().collect(),
            dropped_commands: config.dropped_commands.iter().cloned().collect(),
            drop_nameless_commands: config.drop_nameless_commands,
        }
    }

    fn is_noise(&self, event: &RawEvent) -> bool {
        if self.dropped_kinds.contains(event.kind_name()) {
            return true;
        }
        match event.command_id() {
            Some(id) => {
                (self.drop_nameless_commands && is_nameless(id)) || self.dropped_commands.contains(id)
            }
            None => false,
        }
    }
}

impl CleanupFilter for NoiseFilter {
    fn name(&self) -> &str {
        "remove noise"
    }

    fn process(&mut self, event: RawEvent) -> Vec<RawEvent> {
        if self.is_noise(&event) {
            vec![]
        } else {
            vec![event]
        }
    }
}

/// Removes exact duplicates, e.g. from an archive that was imported twice.
///
/// The stream is time-ordered, so duplicates share a timestamp and only the
/// events of the current timestamp need to be remembered.
#[derive(Debug, Default)]
pub struct DuplicateRemover {
    current: Option<DateTime<Utc>>,
    seen: Vec<RawEvent>,
}

impl CleanupFilter for DuplicateRemover {
    fn name(&self) -> &str {
        "remove duplicates"
    }

    fn process(&mut self, event: RawEvent) -> Vec<RawEvent> {
        if event.triggered_at != self.current {
            self.current = event.triggered_at;
            self.seen.clear();
        }
        if self.seen.contains(&event) {
            return vec![];
        }
        self.seen.push(event.clone());
        vec![event]
    }

    fn end_of_stream(&mut self) -> Vec<RawEvent> {
        self.current = None;
        self.seen.clear();
        vec![]
    }
}
