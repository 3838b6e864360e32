//! Fan-out of one event stream to many transformers.

use super::IntervalTransformer;
use crate::types::{Interval, IntervalKind, RawEvent};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Feeds every event to each registered transformer in registration order.
///
/// Contract violations (an event after end of stream, a second end of stream,
/// an event older than its predecessor) panic: they are bugs in the caller,
/// not data problems.
pub struct IntervalEngine {
    transformers: Vec<Box<dyn IntervalTransformer>>,
    last_time: Option<DateTime<Utc>>,
    flushed: bool,
    emitted: BTreeMap<IntervalKind, usize>,
}

impl Default for IntervalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalEngine {
    /// Create a new engine with no transformers.
    pub fn new() -> Self {
        Self {
            transformers: Vec::new(),
            last_time: None,
            flushed: false,
            emitted: BTreeMap::new(),
        }
    }

    /// Create an engine over an explicit transformer list.
    pub fn with_transformers(transformers: Vec<Box<dyn IntervalTransformer>>) -> Self {
        let mut engine = Self::new();
        for transformer in transformers {
            engine.register(transformer);
        }
        engine
    }

    /// Register a transformer with the engine.
    pub fn register(&mut self, transformer: Box<dyn IntervalTransformer>) {
        assert!(
            !self.flushed,
            "transformer registered after end of stream"
        );
        tracing::debug!(transformer = transformer.name(), "Registered interval transformer");
        self.transformers.push(transformer);
    }

    /// Names of all registered transformers.
    pub fn transformer_names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Deliver one event to every interested transformer.
    pub fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
        assert!(!self.flushed, "event delivered after end of stream");
        if let Some(time) = event.triggered_at {
            if let Some(last) = self.last_time {
                assert!(
                    time >= last,
                    "event delivered out of order: {} after {}",
                    time,
                    last
                );
            }
            self.last_time = Some(time);
        }

        let mut out = Vec::new();
        for transformer in &mut self.transformers {
            if transformer.matches(event) {
                out.extend(transformer.process(event));
            }
        }
        self.count(&out);
        out
    }

    /// Flush every transformer. Must be called exactly once.
    pub fn end_of_stream(&mut self) -> Vec<Interval> {
        assert!(!self.flushed, "end of stream signalled twice");
        self.flushed = true;

        let mut out = Vec::new();
        for transformer in &mut self.transformers {
            let flushed = transformer.end_of_stream();
            tracing::trace!(
                transformer = transformer.name(),
                intervals = flushed.len(),
                "Flushed transformer"
            );
            out.extend(flushed);
        }
        self.count(&out);
        out
    }

    /// Run a whole stream and return every interval, in completion order.
    pub fn run<'a>(&mut self, events: impl IntoIterator<Item = &'a RawEvent>) -> Vec<Interval> {
        let mut out = Vec::new();
        for event in events {
            out.extend(self.process(event));
        }
        out.extend(self.end_of_stream());
        out
    }

    /// Intervals emitted so far, per kind.
    pub fn emitted_by_kind(&self) -> &BTreeMap<IntervalKind, usize> {
        &self.emitted
    }

    fn count(&mut self, intervals: &[Interval]) {
        for interval in intervals {
            *self.emitted.entry(interval.kind()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, IntervalDetails};
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Emits one interval per event on process and one on flush.
    struct Echo {
        seen: usize,
    }

    impl IntervalTransformer for Echo {
        fn name(&self) -> &str {
            "test.echo"
        }

        fn matches(&self, event: &RawEvent) -> bool {
            event.command_id().is_some()
        }

        fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
            self.seen += 1;
            let at = event.triggered_at.unwrap();
            vec![Interval::spanning(at, at, "", IntervalDetails::UserActive)]
        }

        fn end_of_stream(&mut self) -> Vec<Interval> {
            vec![Interval::spanning(t(0), t(1), "", IntervalDetails::IdeOpened)]
        }
    }

    fn engine() -> IntervalEngine {
        IntervalEngine::with_transformers(vec![Box::new(Echo { seen: 0 })])
    }

    #[test]
    fn test_fans_out_only_matching_events() {
        let mut engine = engine();
        let activity = RawEvent::new(EventPayload::Activity).at(t(1));
        let command = RawEvent::command("a").at(t(2));

        assert!(engine.process(&activity).is_empty());
        assert_eq!(engine.process(&command).len(), 1);
        assert_eq!(engine.end_of_stream().len(), 1);

        assert_eq!(engine.emitted_by_kind()[&IntervalKind::UserActive], 1);
        assert_eq!(engine.emitted_by_kind()[&IntervalKind::IdeOpened], 1);
        assert_eq!(engine.transformer_names(), vec!["test.echo"]);
    }

    #[test]
    fn test_run_collects_everything() {
        let events = vec![RawEvent::command("a").at(t(1)), RawEvent::command("b").at(t(2))];
        let intervals = engine().run(&events);
        assert_eq!(intervals.len(), 3);
    }

    #[test]
    #[should_panic(expected = "after end of stream")]
    fn test_event_after_flush_panics() {
        let mut engine = engine();
        engine.end_of_stream();
        engine.process(&RawEvent::command("a").at(t(1)));
    }

    #[test]
    #[should_panic(expected = "signalled twice")]
    fn test_double_flush_panics() {
        let mut engine = engine();
        engine.end_of_stream();
        engine.end_of_stream();
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_out_of_order_event_panics() {
        let mut engine = engine();
        engine.process(&RawEvent::command("a").at(t(5)));
        engine.process(&RawEvent::command("b").at(t(1)));
    }
}
