//! File interaction transformer
//!
//! Tracks whether the developer is reading or typing in the active document.
//! One interval covers one document and one interaction type. An interval
//! closes when:
//! - no event arrives for the timeout (closed at its last seen end)
//! - the active document changes, or a test run starts (cut at that event)
//! - the interaction type changes (cut at that event, so intervals never overlap)
//!
//! Each interval carries the most specific [`DocumentType`] seen for its file
//! so far in the stream.

pub mod document_type;

pub use document_type::classify_document;

use crate::intervals::IntervalTransformer;
use crate::types::{
    DebuggerMode, DocumentAction, DocumentType, EventPayload, FileInteraction, Interval,
    IntervalDetails, RawEvent,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;

/// Command id prefixes that mean the user is typing.
const TYPING_COMMAND_PREFIXES: &[&str] = &["TextControl", "Completion", "VsAction:1:Edit"];

struct OpenInteraction {
    file_name: String,
    session_id: String,
    interaction: FileInteraction,
    document_type: DocumentType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl OpenInteraction {
    fn into_interval(self) -> Interval {
        Interval::spanning(
            self.start,
            self.end,
            self.session_id,
            IntervalDetails::FileInteraction {
                file_name: self.file_name,
                interaction: self.interaction,
                document_type: self.document_type,
            },
        )
    }
}

pub struct FileInteractionTransformer {
    timeout: TimeDelta,
    current: Option<OpenInteraction>,
    debugging: bool,
    document_types: HashMap<String, DocumentType>,
}

impl FileInteractionTransformer {
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            timeout,
            current: None,
            debugging: false,
            document_types: HashMap::new(),
        }
    }

    /// Refine and remember the document type of `file_name`.
    fn refine_document_type(&mut self, file_name: &str, event: &RawEvent) -> DocumentType {
        let known = self
            .document_types
            .entry(file_name.to_string())
            .or_default();
        *known = known.refine(classify_document(event));
        *known
    }

    /// Reading, typing, or irrelevant (`None`).
    fn classify(&self, event: &RawEvent) -> Option<FileInteraction> {
        let current = self.current.as_ref().map(|c| c.interaction);
        match &event.payload {
            EventPayload::Edit { .. } if !self.debugging => Some(FileInteraction::Typing),
            EventPayload::Completion { .. } => Some(FileInteraction::Typing),
            EventPayload::Document {
                action: DocumentAction::Saved,
            } => Some(FileInteraction::Typing),
            EventPayload::Command { command_id }
                if TYPING_COMMAND_PREFIXES
                    .iter()
                    .any(|p| command_id.starts_with(p)) =>
            {
                Some(FileInteraction::Typing)
            }
            EventPayload::Build { .. }
            | EventPayload::Document { .. }
            | EventPayload::Debugger { .. } => Some(FileInteraction::Reading),
            EventPayload::Window { caption, .. } => {
                let document = event.active_document.as_ref()?;
                if caption != document.base_name() {
                    // Tool window, not the editor of this file.
                    return None;
                }
                Some(current.unwrap_or(FileInteraction::Reading))
            }
            EventPayload::Navigation { .. } => Some(current.unwrap_or(FileInteraction::Reading)),
            EventPayload::Activity => current,
            _ => None,
        }
    }

    fn open(
        &mut self,
        event: &RawEvent,
        interaction: FileInteraction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        let Some(document) = &event.active_document else {
            return;
        };
        let file_name = document.file_name.clone();
        let document_type = self.refine_document_type(&file_name, event);
        self.current = Some(OpenInteraction {
            file_name,
            session_id: event.session_id.clone(),
            interaction,
            document_type,
            start,
            end: end.max(start),
        });
    }
}

impl IntervalTransformer for FileInteractionTransformer {
    fn name(&self) -> &str {
        "core.file_interaction"
    }

    fn matches(&self, event: &RawEvent) -> bool {
        event.has_time_data() && event.active_document.is_some()
    }

    fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
        let (Some(start), Some(end)) = (event.triggered_at, event.end_time()) else {
            return vec![];
        };

        let Some(document) = &event.active_document else {
            return vec![];
        };

        // Debugger events only count while a document is active.
        if let EventPayload::Debugger { mode } = &event.payload {
            match mode {
                DebuggerMode::Run => self.debugging = true,
                DebuggerMode::Design => self.debugging = false,
                _ => {}
            }
        }

        let mut out = Vec::new();

        if self
            .current
            .as_ref()
            .is_some_and(|c| start - c.end > self.timeout)
        {
            out.extend(self.current.take().map(OpenInteraction::into_interval));
        }

        let is_test_run = matches!(event.payload, EventPayload::TestRun { .. });
        let document_changed = self
            .current
            .as_ref()
            .is_some_and(|c| c.file_name != document.file_name);
        if is_test_run || document_changed {
            if let Some(mut closing) = self.current.take() {
                closing.end = start.max(closing.start);
                out.push(closing.into_interval());
            }
        }

        let Some(interaction) = self.classify(event) else {
            return out;
        };

        let same_interaction = self
            .current
            .as_ref()
            .map(|c| c.interaction == interaction);
        match same_interaction {
            None => self.open(event, interaction, start, end),
            Some(true) => {
                let file_name = document.file_name.clone();
                let document_type = self.refine_document_type(&file_name, event);
                if let Some(current) = self.current.as_mut() {
                    current.document_type = document_type;
                    current.end = current.end.max(end);
                }
            }
            Some(false) => {
                if let Some(mut closing) = self.current.take() {
                    closing.end = start.max(closing.start);
                    out.push(closing.into_interval());
                }
                self.open(event, interaction, start, end);
            }
        }
        out
    }

    fn end_of_stream(&mut self) -> Vec<Interval> {
        self.current
            .take()
            .map(OpenInteraction::into_interval)
            .into_iter()
            .collect()
    }
}
