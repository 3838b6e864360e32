//! Classification of command identifiers by originating subsystem.
//!
//! The same user action is often recorded twice: once by the IDE's own
//! command system (`{guid}:id:Name`) and once by a plugin framework
//! (`Namespace.Action`). Classifying ids lets the cleanup stage tell the two
//! observations apart and keep the primary one.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// IDE command: `{<guid>}:<numeric id>:<name>`
static VISUAL_STUDIO_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{[^{}]+\}:\d+:").unwrap());

/// Plugin action: dotted identifier path such as `TextControl.Backspace`
static RESHARPER_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)+$").unwrap());

/// Probable originating subsystem of a command id.
///
/// Ordered by preference: when two classes describe the same action, the
/// smaller one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandClass {
    VisualStudioCommand,
    ReSharperCommand,
    Other,
}

impl CommandClass {
    /// Classify a command id. Pure and total.
    pub fn classify(command_id: &str) -> CommandClass {
        if VISUAL_STUDIO_COMMAND.is_match(command_id) {
            CommandClass::VisualStudioCommand
        } else if RESHARPER_COMMAND.is_match(command_id) {
            CommandClass::ReSharperCommand
        } else {
            CommandClass::Other
        }
    }
}

/// Order two command ids: by class, then case-sensitive lexicographically.
pub fn compare_commands(a: &str, b: &str) -> Ordering {
    CommandClass::classify(a)
        .cmp(&CommandClass::classify(b))
        .then_with(|| a.cmp(b))
}

/// [`compare_commands`] as -1, 0 or 1.
pub fn compare(a: &str, b: &str) -> i32 {
    match compare_commands(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Whether a command id has no name part, e.g. `{guid}:42:`.
pub fn is_nameless(command_id: &str) -> bool {
    command_id.is_empty() || command_id.ends_with(':')
}
