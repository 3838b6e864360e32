//! Built-in interval transformers
//!
//! Each transformer lives in its own subdirectory.
//!
//! ## Built-in Transformers
//!
//! - [`user_active`]: periods of continuous user activity per session
//! - [`ide_opened`]: IDE open/closed lifecycle per session
//! - [`test_run`]: one interval per unit test run
//! - [`file_interaction`]: reading/typing per document, with document type
//!
//! Use [`create_default_transformers`] for a fresh set honoring
//! `intervals.disabled_transformers`.

pub mod file_interaction;
pub mod ide_opened;
pub mod test_run;
pub mod user_active;

use super::{IntervalEngine, IntervalTransformer};
use crate::config::IntervalsConfig;

/// Build a fresh set of enabled built-in transformers.
pub fn create_default_transformers(config: &IntervalsConfig) -> Vec<Box<dyn IntervalTransformer>> {
    let all: Vec<Box<dyn IntervalTransformer>> = vec![
        Box::new(user_active::UserActiveTransformer::new(config.inactivity())),
        Box::new(ide_opened::IdeOpenedTransformer::new()),
        Box::new(test_run::TestRunTransformer::new(
            config.test_run_commands.clone(),
        )),
        Box::new(file_interaction::FileInteractionTransformer::new(
            config.file_timeout(),
        )),
    ];
    all.into_iter()
        .filter(|t| config.is_enabled(t.name()))
        .collect()
}

/// Create an engine with all enabled built-in transformers registered.
pub fn create_default_engine(config: &IntervalsConfig) -> IntervalEngine {
    IntervalEngine::with_transformers(create_default_transformers(config))
}
