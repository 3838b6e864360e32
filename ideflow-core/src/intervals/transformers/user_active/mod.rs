//! User activity transformer
//!
//! Any timed event of a session is evidence that the user was active. Events
//! of one session closer together than the inactivity threshold form one
//! continuous [`IntervalKind::UserActive`](crate::types::IntervalKind) period.

use crate::intervals::{GapMerger, IntervalTransformer, Span};
use crate::types::{Interval, IntervalDetails, RawEvent};
use chrono::TimeDelta;
use std::collections::BTreeMap;

/// Per-session activity periods.
pub struct UserActiveTransformer {
    inactivity: TimeDelta,
    sessions: BTreeMap<String, GapMerger>,
}

impl UserActiveTransformer {
    pub fn new(inactivity: TimeDelta) -> Self {
        Self {
            inactivity,
            sessions: BTreeMap::new(),
        }
    }

    fn interval(session_id: &str, span: Span) -> Interval {
        Interval::spanning(span.start, span.end, session_id, IntervalDetails::UserActive)
    }
}

impl IntervalTransformer for UserActiveTransformer {
    fn name(&self) -> &str {
        "core.user_active"
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.has_time_data()
    }

    fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
        let (Some(start), Some(end)) = (event.triggered_at, event.end_time()) else {
            return vec![];
        };
        let inactivity = self.inactivity;
        let merger = self
            .sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| GapMerger::new(inactivity));

        merger
            .observe(start, end)
            .map(|span| Self::interval(&event.session_id, span))
            .into_iter()
            .collect()
    }

    fn end_of_stream(&mut self) -> Vec<Interval> {
        let mut out: Vec<Interval> = std::mem::take(&mut self.sessions)
            .into_iter()
            .filter_map(|(session, mut merger)| {
                merger.flush().map(|span| Self::interval(&session, span))
            })
            .collect();
        out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.session_id.cmp(&b.session_id)));
        out
    }
}
