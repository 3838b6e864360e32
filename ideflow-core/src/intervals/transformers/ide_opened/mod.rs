//! IDE lifecycle transformer
//!
//! Derives "IDE was open" intervals per session from lifecycle events. An
//! interval opens on a startup event (or the first event seen for a session),
//! extends with every event of that session, and closes on shutdown. A second
//! startup without a shutdown in between closes the dangling interval at the
//! last time the session was seen.

use crate::intervals::{IntervalTransformer, Span};
use crate::types::{EventPayload, IdePhase, Interval, IntervalDetails, RawEvent};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct IdeOpenedTransformer {
    open: BTreeMap<String, Span>,
}

impl IdeOpenedTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    fn interval(session_id: &str, span: Span) -> Interval {
        Interval::spanning(span.start, span.end, session_id, IntervalDetails::IdeOpened)
    }
}

impl IntervalTransformer for IdeOpenedTransformer {
    fn name(&self) -> &str {
        "core.ide_opened"
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.has_time_data()
    }

    fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
        let (Some(start), Some(end)) = (event.triggered_at, event.end_time()) else {
            return vec![];
        };
        let session = &event.session_id;
        let mut out = Vec::new();

        match &event.payload {
            EventPayload::IdeState {
                phase: IdePhase::Startup,
            } => {
                if let Some(dangling) = self.open.remove(session) {
                    tracing::debug!(session = %session, "Startup without shutdown, closing dangling interval");
                    out.push(Self::interval(session, dangling));
                }
                self.open.insert(session.clone(), Span::new(start, end));
            }
            EventPayload::IdeState {
                phase: IdePhase::Shutdown,
            } => {
                let mut span = self
                    .open
                    .remove(session)
                    .unwrap_or_else(|| Span::new(start, end));
                span.extend_to(end);
                out.push(Self::interval(session, span));
            }
            _ => {
                self.open
                    .entry(session.clone())
                    .and_modify(|span| span.extend_to(end))
                    .or_insert_with(|| Span::new(start, end));
            }
        }
        out
    }

    fn end_of_stream(&mut self) -> Vec<Interval> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|(session, span)| Self::interval(&session, span))
            .collect()
    }
}
