//! Gap-based span merging shared by interval transformers.
//!
//! A [`GapMerger`] is the `Idle -> Open -> Idle` state machine behind most
//! transformers: an observation opens a span, later observations extend it
//! while the gap to the tracked end stays within the threshold, and a larger
//! gap closes it and opens a new one.

use chrono::{DateTime, TimeDelta, Utc};

/// A closed or open time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Extend the end, never shrinking the span.
    pub fn extend_to(&mut self, end: DateTime<Utc>) {
        self.end = self.end.max(end);
    }
}

/// Merges observations into spans separated by gaps larger than `gap`.
#[derive(Debug, Clone)]
pub struct GapMerger {
    gap: TimeDelta,
    open: Option<Span>,
}

impl GapMerger {
    pub fn new(gap: TimeDelta) -> Self {
        Self { gap, open: None }
    }

    /// Record an observation covering `start..end`.
    ///
    /// Returns the span that was closed by this observation, if any.
    pub fn observe(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Span> {
        let observed = Span::new(start, end);
        match &mut self.open {
            Some(span) if start - span.end <= self.gap => {
                span.extend_to(observed.end);
                None
            }
            Some(span) => {
                let closed = *span;
                *span = observed;
                Some(closed)
            }
            None => {
                self.open = Some(observed);
                None
            }
        }
    }

    /// Close and return the open span, if any.
    pub fn flush(&mut self) -> Option<Span> {
        self.open.take()
    }
}
