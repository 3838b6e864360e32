//! Interval transformer framework
//!
//! Transformers turn a group's cleaned, time-ordered event stream into
//! [`Interval`](crate::types::Interval)s. Each transformer is a small state
//! machine that returns completed intervals directly from
//! [`IntervalTransformer::process`] and [`IntervalTransformer::end_of_stream`].
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      INTERVAL ENGINE                          │
//! │                                                               │
//! │  cleaned event ──┬──────────────┬──────────────┬─────────     │
//! │                  ▼              ▼              ▼              │
//! │          ┌─────────────┐ ┌─────────────┐ ┌─────────────┐      │
//! │          │ user_active │ │ ide_opened  │ │ test_run    │ ...  │
//! │          └──────┬──────┘ └──────┬──────┘ └──────┬──────┘      │
//! │                 └───────────────┴───────┬───────┘             │
//! │                                         ▼                     │
//! │                            Vec<Interval> (completion order)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transformer state lives only as long as one stream: build a fresh set of
//! transformers per group with [`create_default_transformers`].

pub mod engine;
pub mod span;
pub mod transformers;

pub use engine::IntervalEngine;
pub use span::{GapMerger, Span};
pub use transformers::{create_default_engine, create_default_transformers};

use crate::types::{Interval, RawEvent};

/// A stateful converter from ordered events to intervals.
///
/// The engine guarantees that events arrive in time order, that only events
/// accepted by [`matches`](Self::matches) reach [`process`](Self::process),
/// and that [`end_of_stream`](Self::end_of_stream) is called exactly once,
/// after the last event.
///
/// ## Example
///
/// ```rust,ignore
/// use ideflow_core::intervals::IntervalTransformer;
///
/// struct BuildCounter;
///
/// impl IntervalTransformer for BuildCounter {
///     fn name(&self) -> &str { "custom.builds" }
///     fn matches(&self, event: &RawEvent) -> bool { event.kind_name() == "build" }
///     fn process(&mut self, event: &RawEvent) -> Vec<Interval> { vec![] }
///     fn end_of_stream(&mut self) -> Vec<Interval> { vec![] }
/// }
/// ```
pub trait IntervalTransformer: Send {
    /// Unique name.
    ///
    /// Convention: `namespace.transformer_name` (e.g., "core.user_active")
    fn name(&self) -> &str;

    /// Whether this transformer wants to see `event`.
    fn matches(&self, _event: &RawEvent) -> bool {
        true
    }

    /// Consume one event, returning intervals completed by it.
    fn process(&mut self, event: &RawEvent) -> Vec<Interval>;

    /// Close whatever is still open.
    fn end_of_stream(&mut self) -> Vec<Interval>;
}
