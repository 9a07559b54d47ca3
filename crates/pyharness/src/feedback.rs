//! What a question page shows after a run: the banner and one row per case.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::backend::AttemptResponse;
use crate::runner::RunSummary;
use crate::testcase::TestCase;
use crate::types::FailureKind;

pub const ALL_PASSED_TEXT: &str = "Great work! All the tests passed.";
pub const SOME_FAILED_TEXT: &str =
    "Oh no! It seems like some of the tests did not pass. Try to figure out why, and then try again.";
pub const INDENTATION_WARNING_TEXT: &str =
    "Your code contains tab characters. Please indent with spaces instead, then run your code again.";
pub const SCAFFOLD_HINT_TEXT: &str =
    "This error occurred in the test code, not your code. Check what your code returns or prints for this test.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Banner {
    AllPassed,
    SomeFailed,
    IndentationWarning,
}

impl Banner {
    pub fn text(self) -> &'static str {
        match self {
            Banner::AllPassed => ALL_PASSED_TEXT,
            Banner::SomeFailed => SOME_FAILED_TEXT,
            Banner::IndentationWarning => INDENTATION_WARNING_TEXT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    Passed,
    Failed,
    /// Reset and not run (indentation warning).
    NotRun,
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub id: u64,
    pub number: u32,
    pub status: RowStatus,
    pub expected_output: String,
    /// Received output with trailing whitespace removed.
    pub displayed_output: String,
    pub is_error: bool,
    pub failure: Option<FailureKind>,
    /// 1-based lines where received and expected output differ.
    pub mismatched_lines: Vec<usize>,
    /// The error was raised below the learner's code, in test scaffolding.
    pub scaffold_hint: bool,
}

impl RowReport {
    fn build(case: &TestCase, user_code: &str, ran: bool) -> Self {
        let displayed_output = case.received_output().trim_end().to_owned();
        let status = match (ran, case.passed()) {
            (false, _) => RowStatus::NotRun,
            (true, true) => RowStatus::Passed,
            (true, false) => RowStatus::Failed,
        };
        let mismatched_lines = if status == RowStatus::Failed && !case.runtime_error() {
            mismatched_lines(case.expected_output(), case.received_output())
        } else {
            Vec::new()
        };
        Self {
            id: case.id(),
            number: case.number(),
            status,
            expected_output: case.expected_output().trim_end().to_owned(),
            scaffold_hint: case.runtime_error() && error_in_scaffolding(&displayed_output, user_code),
            displayed_output,
            is_error: case.runtime_error(),
            failure: case.failure(),
            mismatched_lines,
        }
    }
}

/// Everything rendered after one press of Run or Submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub banner: Banner,
    pub banner_text: &'static str,
    /// `None` when the run was blocked by the indentation check.
    pub summary: Option<RunSummary>,
    pub rows: Vec<RowReport>,
    /// The backend's answer to a submission, when one was made and succeeded.
    pub attempt: Option<AttemptResponse>,
}

impl RunReport {
    pub fn from_run(summary: RunSummary, cases: &[TestCase], user_code: &str) -> Self {
        let banner = if summary.all_passed() {
            Banner::AllPassed
        } else {
            Banner::SomeFailed
        };
        Self {
            banner,
            banner_text: banner.text(),
            summary: Some(summary),
            rows: cases
                .iter()
                .map(|case| RowReport::build(case, user_code, true))
                .collect(),
            attempt: None,
        }
    }

    pub fn indentation_warning(cases: &[TestCase], user_code: &str) -> Self {
        Self {
            banner: Banner::IndentationWarning,
            banner_text: Banner::IndentationWarning.text(),
            summary: None,
            rows: cases
                .iter()
                .map(|case| RowReport::build(case, user_code, false))
                .collect(),
            attempt: None,
        }
    }
}

fn line_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"line (\d+)").expect("line pattern is valid"))
}

/// Whether an error's innermost reported line lies past the end of the
/// learner's code, i.e. in the test code appended after it.
pub fn error_in_scaffolding(error_text: &str, user_code: &str) -> bool {
    let innermost = line_number_pattern()
        .captures_iter(error_text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .last();
    match innermost {
        Some(line) => line > user_code.split('\n').count(),
        None => false,
    }
}

/// 1-based line numbers where `received` differs from `expected`, after
/// trailing whitespace is removed from both texts and from each line.
pub fn mismatched_lines(expected: &str, received: &str) -> Vec<usize> {
    let expected: Vec<&str> = expected.trim_end().split('\n').collect();
    let received: Vec<&str> = received.trim_end().split('\n').collect();
    let longest = expected.len().max(received.len());
    (0..longest)
        .filter(|&i| {
            let e = expected.get(i).map(|l| l.trim_end());
            let r = received.get(i).map(|l| l.trim_end());
            e != r
        })
        .map(|i| i + 1)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
