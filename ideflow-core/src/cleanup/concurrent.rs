//! Concurrent-event detection and deduplication of double-recorded commands.

use super::commands::CommandClass;
use super::CleanupFilter;
use crate::config::CleanupConfig;
use crate::types::{RawEvent, Trigger};
use chrono::TimeDelta;
use std::collections::HashSet;

/// Decides whether two events are close enough in time to be one action.
#[derive(Debug, Clone)]
pub struct ConcurrentEventHeuristic {
    threshold: TimeDelta,
    ignorable: HashSet<String>,
}

impl ConcurrentEventHeuristic {
    pub fn new(threshold: TimeDelta, ignorable: impl IntoIterator<Item = String>) -> Self {
        Self {
            threshold,
            ignorable: ignorable.into_iter().collect(),
        }
    }

    pub fn from_config(config: &CleanupConfig) -> Self {
        Self::new(
            config.concurrent_threshold(),
            config.ignorable_commands.iter().cloned(),
        )
    }

    /// `|a - b| <= threshold`. Events without time data are never concurrent.
    pub fn are_concurrent(&self, a: &RawEvent, b: &RawEvent) -> bool {
        match (a.triggered_at, b.triggered_at) {
            (Some(ta), Some(tb)) => (ta - tb).abs() <= self.threshold,
            _ => false,
        }
    }

    /// Low-level text navigation command that does not justify a merge on its own.
    pub fn is_ignorable(&self, command_id: &str) -> bool {
        self.ignorable.contains(command_id)
    }

    /// Two concurrent commands from different subsystems, not both noise.
    pub fn are_duplicate_commands(&self, a: &RawEvent, b: &RawEvent) -> bool {
        let (Some(id_a), Some(id_b)) = (a.command_id(), b.command_id()) else {
            return false;
        };
        self.are_concurrent(a, b)
            && CommandClass::classify(id_a) != CommandClass::classify(id_b)
            && !(self.is_ignorable(id_a) && self.is_ignorable(id_b))
    }
}

/// Fold `dropped` into `kept`: adopt a known trigger and the later end time.
pub fn merge_commands(mut kept: RawEvent, dropped: &RawEvent) -> RawEvent {
    if kept.triggered_by == Trigger::Unknown {
        kept.triggered_by = dropped.triggered_by;
    }
    kept.terminated_at = kept.terminated_at.max(dropped.terminated_at);
    kept
}

/// Collapses concurrent commands recorded by different subsystems.
///
/// Holds back the latest command (the anchor) together with the events that
/// followed it, until an event arrives more than the threshold after the
/// anchor. Each command is compared only with the anchor, so the work per
/// event is constant.
pub struct ConcurrentCommandMerger {
    heuristic: ConcurrentEventHeuristic,
    window: Vec<RawEvent>,
    anchor: Option<usize>,
    merged: usize,
}

impl ConcurrentCommandMerger {
    pub fn new(heuristic: ConcurrentEventHeuristic) -> Self {
        Self {
            heuristic,
            window: Vec::new(),
            anchor: None,
            merged: 0,
        }
    }

    fn anchor_event(&self) -> Option<&RawEvent> {
        self.anchor.map(|i| &self.window[i])
    }

    fn drain(&mut self) -> Vec<RawEvent> {
        self.anchor = None;
        std::mem::take(&mut self.window)
    }
}

impl CleanupFilter for ConcurrentCommandMerger {
    fn name(&self) -> &str {
        "merge concurrent commands"
    }

    fn process(&mut self, event: RawEvent) -> Vec<RawEvent> {
        let mut out = Vec::new();

        let expired = self.anchor_event().is_some_and(|anchor| {
            !self.heuristic.are_concurrent(anchor, &event)
        });
        if expired {
            out.extend(self.drain());
        }

        if event.command_id().is_none() {
            if self.anchor.is_some() {
                self.window.push(event);
            } else {
                out.push(event);
            }
            return out;
        }

        let Some(anchor_idx) = self.anchor else {
            self.window.push(event);
            self.anchor = Some(self.window.len() - 1);
            return out;
        };

        let anchor = &self.window[anchor_idx];
        if !self.heuristic.are_duplicate_commands(anchor, &event) {
            out.extend(self.drain());
            self.window.push(event);
            self.anchor = Some(0);
            return out;
        }

        self.merged += 1;
        let anchor_class = CommandClass::classify(anchor.command_id().unwrap_or_default());
        let event_class = CommandClass::classify(event.command_id().unwrap_or_default());
        tracing::trace!(
            kept = ?anchor_class.min(event_class),
            anchor = anchor.command_id().unwrap_or_default(),
            other = event.command_id().unwrap_or_default(),
            "Merging concurrent commands"
        );

        if anchor_class <= event_class {
            let kept = self.window.remove(anchor_idx);
            self.window.insert(anchor_idx, merge_commands(kept, &event));
        } else {
            let dropped = self.window.remove(anchor_idx);
            self.window.push(merge_commands(event, &dropped));
            self.anchor = Some(self.window.len() - 1);
        }
        out
    }

    fn end_of_stream(&mut self) -> Vec<RawEvent> {
        self.drain()
    }

    fn merged_events(&self) -> usize {
        self.merged
    }
}
