//! Core domain types for ideflow
//!
//! These types describe the records the pipeline consumes (Layer 0 events
//! inside archives) and the records it derives (Layer 2 intervals).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Archive** | An append-only JSONL file of events from one recording session |
//! | **RawEvent** | One immutable IDE interaction record, as written by the capture side |
//! | **Identifier** | An opaque correlation token (session id, profile id) found in events |
//! | **UserGroup** | A maximal set of archives transitively connected by shared identifiers |
//! | **Interval** | A derived, immutable time range (user active, test run, ...) |
//!
//! Identifiers are correlation keys only. Nothing here verifies who a user is.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Opaque correlation token extracted from events.
pub type Identifier = String;

// ============================================
// Raw events
// ============================================

/// How the user triggered an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Unknown,
    Click,
    Shortcut,
    Typing,
    Automatic,
}

/// Reference to the document that was active when an event fired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Full path of the document as recorded by the IDE
    pub file_name: String,
    /// Language identifier (e.g. "CSharp"), if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl DocumentRef {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            language: None,
        }
    }

    /// File name without directories. Archives recorded on Windows use `\`.
    pub fn base_name(&self) -> &str {
        self.file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_name)
    }
}

/// Summary of the code structure an edit or completion happened in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    /// Enclosing type, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Invoked method names inside the enclosing member
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAction {
    Opened,
    Saved,
    Closed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebuggerMode {
    Design,
    Run,
    Break,
    #[serde(other)]
    Unknown,
}

/// Lifecycle phase of the IDE process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdePhase {
    Startup,
    Runtime,
    Shutdown,
}

/// Outcome of a test case or of a whole test run.
///
/// Variant order is severity order, used when aggregating a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    #[default]
    Unknown,
    Ignored,
    Success,
    Failed,
    Error,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Unknown => "unknown",
            TestResult::Ignored => "ignored",
            TestResult::Success => "success",
            TestResult::Failed => "failed",
            TestResult::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_method: String,
    #[serde(default)]
    pub result: TestResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Kind-specific part of a [`RawEvent`].
///
/// Serialized inline with the event, discriminated by `kind`. Unknown kinds
/// deserialize to [`EventPayload::Other`] so newer capture versions do not
/// turn whole records into corrupt ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Command {
        command_id: String,
    },
    Edit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<CodeContext>,
        #[serde(default)]
        number_of_changes: u32,
    },
    Completion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<CodeContext>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminated_state: Option<String>,
    },
    Document {
        action: DocumentAction,
    },
    Window {
        #[serde(default)]
        caption: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
    Build {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
    Debugger {
        mode: DebuggerMode,
    },
    Navigation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    TestRun {
        #[serde(default)]
        was_aborted: bool,
        #[serde(default)]
        tests: Vec<TestCaseResult>,
    },
    IdeState {
        phase: IdePhase,
    },
    UserProfile {
        profile_id: String,
    },
    Activity,
    Info {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

impl EventPayload {
    /// Serialized `kind` discriminant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EventPayload::Command { .. } => "command",
            EventPayload::Edit { .. } => "edit",
            EventPayload::Completion { .. } => "completion",
            EventPayload::Document { .. } => "document",
            EventPayload::Window { .. } => "window",
            EventPayload::Build { .. } => "build",
            EventPayload::Debugger { .. } => "debugger",
            EventPayload::Navigation { .. } => "navigation",
            EventPayload::TestRun { .. } => "test_run",
            EventPayload::IdeState { .. } => "ide_state",
            EventPayload::UserProfile { .. } => "user_profile",
            EventPayload::Activity => "activity",
            EventPayload::Info { .. } => "info",
            EventPayload::Error { .. } => "error",
            EventPayload::Other => "other",
        }
    }
}

/// One recorded IDE interaction.
///
/// Produced by the capture side and never mutated by analysis code; cleanup
/// filters that "fix" events emit corrected copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub triggered_by: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_document: Option<DocumentRef>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl RawEvent {
    /// Create an event with no time data, session, or document.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            triggered_at: None,
            terminated_at: None,
            session_id: String::new(),
            triggered_by: Trigger::Unknown,
            active_document: None,
            payload,
        }
    }

    /// Shorthand for a command event.
    pub fn command(command_id: impl Into<String>) -> Self {
        Self::new(EventPayload::Command {
            command_id: command_id.into(),
        })
    }

    pub fn at(mut self, triggered_at: DateTime<Utc>) -> Self {
        self.triggered_at = Some(triggered_at);
        self
    }

    pub fn until(mut self, terminated_at: DateTime<Utc>) -> Self {
        self.terminated_at = Some(terminated_at);
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn triggered_by(mut self, trigger: Trigger) -> Self {
        self.triggered_by = trigger;
        self
    }

    pub fn with_document(mut self, file_name: impl Into<String>) -> Self {
        self.active_document = Some(DocumentRef::new(file_name));
        self
    }

    pub fn kind_name(&self) -> &'static str {
        self.payload.kind_name()
    }

    /// Command id, for command events.
    pub fn command_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Command { command_id } => Some(command_id),
            _ => None,
        }
    }

    pub fn has_time_data(&self) -> bool {
        self.triggered_at.is_some()
    }

    /// `terminated_at`, falling back to `triggered_at`.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.terminated_at.or(self.triggered_at)
    }
}

// ============================================
// Archives and groups
// ============================================

/// An archive discovered under the input root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Archive {
    /// Path relative to the archive root, with `/` separators
    pub relative_path: String,
    /// Absolute path on disk
    pub path: PathBuf,
}

/// Archives that belong to one user, as far as identifiers can tell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    /// Relative archive paths, sorted
    pub archives: Vec<String>,
    /// Union of the member archives' identifiers
    pub identifiers: BTreeSet<Identifier>,
}

impl UserGroup {
    /// Stable label for the group: its first archive path.
    pub fn label(&self) -> &str {
        self.archives.first().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.archives.iter().any(|a| a == relative_path)
    }
}

// ============================================
// Intervals
// ============================================

/// Whether the developer was reading or typing in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileInteraction {
    Reading,
    Typing,
}

/// Best guess at what kind of code a file contains.
///
/// Variants are ordered by specificity; refinement only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    Undefined,
    Production,
    PathnameTest,
    FilenameTest,
    Test,
}

impl DocumentType {
    /// Combine with new evidence; the more specific classification wins.
    pub fn refine(self, evidence: DocumentType) -> DocumentType {
        self.max(evidence)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Undefined => "undefined",
            DocumentType::Production => "production",
            DocumentType::PathnameTest => "pathname_test",
            DocumentType::FilenameTest => "filename_test",
            DocumentType::Test => "test",
        }
    }
}

/// Discriminant of [`IntervalDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    UserActive,
    IdeOpened,
    TestRun,
    FileInteraction,
}

impl IntervalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalKind::UserActive => "user_active",
            IntervalKind::IdeOpened => "ide_opened",
            IntervalKind::TestRun => "test_run",
            IntervalKind::FileInteraction => "file_interaction",
        }
    }
}

impl std::fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific fields of an [`Interval`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntervalDetails {
    UserActive,
    IdeOpened,
    TestRun {
        /// Command id or `test_run` that produced the interval
        source: String,
        test_count: usize,
        result: TestResult,
    },
    FileInteraction {
        file_name: String,
        interaction: FileInteraction,
        document_type: DocumentType,
    },
}

impl IntervalDetails {
    pub fn kind(&self) -> IntervalKind {
        match self {
            IntervalDetails::UserActive => IntervalKind::UserActive,
            IntervalDetails::IdeOpened => IntervalKind::IdeOpened,
            IntervalDetails::TestRun { .. } => IntervalKind::TestRun,
            IntervalDetails::FileInteraction { .. } => IntervalKind::FileInteraction,
        }
    }
}

/// A closed, immutable time range derived from one or more events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: TimeDelta,
    pub session_id: String,
    #[serde(flatten)]
    pub details: IntervalDetails,
}

impl Interval {
    /// Build an interval spanning `start..end`. A reversed range yields zero duration.
    pub fn spanning(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        session_id: impl Into<String>,
        details: IntervalDetails,
    ) -> Self {
        Self {
            start,
            duration: (end - start).max(TimeDelta::zero()),
            session_id: session_id.into(),
            details,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    pub fn kind(&self) -> IntervalKind {
        self.details.kind()
    }
}

mod duration_ms {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TimeDelta, D::Error> {
        i64::deserialize(d).map(TimeDelta::milliseconds)
    }
}
