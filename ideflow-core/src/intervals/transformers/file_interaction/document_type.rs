//! Guessing whether a document is test code.
//!
//! Evidence, strongest first:
//! 1. code context with assertion-style invocations or a test fixture type
//! 2. a test-like file name (`FooTest.cs`, `test_foo.py`)
//! 3. a test-like directory in the path (`Project.Tests/Foo.cs`)
//! 4. code context without test markers (production code)

use crate::types::{CodeContext, DocumentRef, DocumentType, EventPayload, RawEvent};
use once_cell::sync::Lazy;
use regex::Regex;

/// `Assert.AreEqual`, `assertEquals`, `x.Should().Be(..)`
static ASSERTION_INVOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\.)(assert|should)").unwrap());

static TEST_TYPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Test|Tests|Fixture|Spec)$").unwrap());

/// File stem that names a test: `FooTest`, `FooTests`, `test_foo`, `foo_spec`
static TEST_FILE_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^tests?[_.\-]|[_.\-]?tests?$|[_.\-]specs?$)").unwrap());

/// Directory that holds tests: `test`, `tests`, `UnitTests`, `Foo.Tests`
static TEST_DIRECTORY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)tests?$").unwrap());

fn is_test_context(context: &CodeContext) -> bool {
    context
        .type_name
        .as_deref()
        .is_some_and(|t| TEST_TYPE_NAME.is_match(t))
        || context
            .invocations
            .iter()
            .any(|i| ASSERTION_INVOCATION.is_match(i))
}

fn is_test_file_name(document: &DocumentRef) -> bool {
    let name = document.base_name();
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    TEST_FILE_STEM.is_match(stem)
}

fn is_test_path(document: &DocumentRef) -> bool {
    let mut parts: Vec<&str> = document.file_name.split(['/', '\\']).collect();
    parts.pop();
    parts.iter().any(|dir| TEST_DIRECTORY.is_match(dir))
}

fn code_context(event: &RawEvent) -> Option<&CodeContext> {
    match &event.payload {
        EventPayload::Edit { context, .. } | EventPayload::Completion { context, .. } => {
            context.as_ref()
        }
        _ => None,
    }
}

/// Classify the active document of `event` using only that event.
pub fn classify_document(event: &RawEvent) -> DocumentType {
    let Some(document) = &event.active_document else {
        return DocumentType::Undefined;
    };
    let context = code_context(event);

    if context.is_some_and(is_test_context) {
        DocumentType::Test
    } else if is_test_file_name(document) {
        DocumentType::FilenameTest
    } else if is_test_path(document) {
        DocumentType::PathnameTest
    } else if context.is_some() {
        DocumentType::Production
    } else {
        DocumentType::Undefined
    }
}
