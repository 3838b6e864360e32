//! Unit test run transformer
//!
//! Emits one interval per test run, spanning the run's own triggered and
//! terminated times. Runs are recognised either by a `test_run` event or by a
//! command whose id starts with a configured test-run prefix.

use crate::intervals::IntervalTransformer;
use crate::types::{EventPayload, Interval, IntervalDetails, RawEvent, TestCaseResult, TestResult};

pub struct TestRunTransformer {
    command_prefixes: Vec<String>,
}

impl TestRunTransformer {
    pub fn new(command_prefixes: Vec<String>) -> Self {
        Self { command_prefixes }
    }

    fn is_test_command(&self, command_id: &str) -> bool {
        self.command_prefixes
            .iter()
            .any(|prefix| command_id.starts_with(prefix.as_str()))
    }
}

/// Overall outcome of a run: the most severe test result.
pub fn aggregate_result(was_aborted: bool, tests: &[TestCaseResult]) -> TestResult {
    if was_aborted {
        return TestResult::Unknown;
    }
    tests
        .iter()
        .map(|t| t.result)
        .max()
        .unwrap_or(TestResult::Unknown)
}

impl IntervalTransformer for TestRunTransformer {
    fn name(&self) -> &str {
        "core.test_run"
    }

    fn matches(&self, event: &RawEvent) -> bool {
        match &event.payload {
            EventPayload::TestRun { .. } => true,
            EventPayload::Command { command_id } => self.is_test_command(command_id),
            _ => false,
        }
    }

    fn process(&mut self, event: &RawEvent) -> Vec<Interval> {
        let (Some(start), Some(end)) = (event.triggered_at, event.end_time()) else {
            return vec![];
        };
        let details = match &event.payload {
            EventPayload::TestRun { was_aborted, tests } => IntervalDetails::TestRun {
                source: "test_run".to_string(),
                test_count: tests.len(),
                result: aggregate_result(*was_aborted, tests),
            },
            EventPayload::Command { command_id } => IntervalDetails::TestRun {
                source: command_id.clone(),
                test_count: 0,
                result: TestResult::Unknown,
            },
            _ => return vec![],
        };
        vec![Interval::spanning(start, end, event.session_id.clone(), details)]
    }

    fn end_of_stream(&mut self) -> Vec<Interval> {
        vec![]
    }
}
