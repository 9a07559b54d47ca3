//! Test cases as served with a question page.
//!
//! A test case either appends code to the learner's program (function,
//! debugging and Parsons questions) or feeds the program lines of input
//! (program questions). Which one is decided by the question type when the
//! page is loaded, never per test case.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::types::{ExecutionRequest, ExecutionResult, FailureKind};

/// How test cases drive the learner's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Append test code to the learner's code and run the result.
    CodeCompletion,
    /// Run the learner's code with the test input on stdin.
    Program,
}

/// A test case exactly as it appears in page data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTestCase {
    pub id: u64,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub test_code: Option<String>,
    #[serde(default)]
    pub test_input: Option<String>,
    #[serde(default)]
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TestCaseKind {
    CodeCompletion { append_code: String },
    Program { stdin_lines: Vec<String> },
}

/// One test case together with the outcome of its latest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    id: u64,
    number: u32,
    kind: TestCaseKind,
    expected_output: String,
    received_output: String,
    runtime_error: bool,
    failure: Option<FailureKind>,
    passed: bool,
}

impl TestCase {
    pub fn new(id: u64, number: u32, kind: TestCaseKind, expected_output: impl Into<String>) -> Self {
        Self {
            id,
            number,
            kind,
            expected_output: expected_output.into(),
            received_output: String::new(),
            runtime_error: false,
            failure: None,
            passed: false,
        }
    }

    /// A code-completion case that appends `test_code`. The id doubles as the
    /// display number; ids past `u32::MAX` sort last.
    pub fn code_completion(id: u64, test_code: impl Into<String>, expected_output: impl Into<String>) -> Self {
        let kind = TestCaseKind::CodeCompletion {
            append_code: test_code.into(),
        };
        Self::new(id, number_from_id(id), kind, expected_output)
    }

    /// A program case fed from `test_input`, one line per `input()` call.
    pub fn program(id: u64, test_input: &str, expected_output: impl Into<String>) -> Self {
        let kind = TestCaseKind::Program {
            stdin_lines: test_input.lines().map(str::to_owned).collect(),
        };
        Self::new(id, number_from_id(id), kind, expected_output)
    }

    /// Resolve page data against the question's input mode.
    pub fn resolve(raw: RawTestCase, mode: InputMode) -> Result<Self, LoadError> {
        let kind = match mode {
            InputMode::CodeCompletion => match raw.test_code {
                Some(append_code) => TestCaseKind::CodeCompletion { append_code },
                None => {
                    return Err(LoadError::MismatchedTestCase {
                        id: raw.id,
                        question_type: "code-completion",
                        expected_field: "test_code",
                    })
                }
            },
            InputMode::Program => match raw.test_input {
                Some(input) => TestCaseKind::Program {
                    stdin_lines: input.lines().map(str::to_owned).collect(),
                },
                None => {
                    return Err(LoadError::MismatchedTestCase {
                        id: raw.id,
                        question_type: "program",
                        expected_field: "test_input",
                    })
                }
            },
        };
        Ok(Self::new(raw.id, raw.number, kind, raw.expected_output))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn kind(&self) -> &TestCaseKind {
        &self.kind
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    /// Output of the latest run, or its error message.
    pub fn received_output(&self) -> &str {
        &self.received_output
    }

    pub fn runtime_error(&self) -> bool {
        self.runtime_error
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Forget the latest run.
    pub fn reset(&mut self) {
        self.received_output.clear();
        self.runtime_error = false;
        self.failure = None;
        self.passed = false;
    }

    /// The program to run for this case.
    pub fn request(&self, user_code: &str, timeout_ms: u64) -> ExecutionRequest {
        match &self.kind {
            TestCaseKind::CodeCompletion { append_code } => {
                ExecutionRequest::function(format!("{user_code}\n{append_code}"), timeout_ms)
            }
            TestCaseKind::Program { stdin_lines } => {
                ExecutionRequest::program(user_code, stdin_lines.clone(), timeout_ms)
            }
        }
    }

    /// Record a run's outcome and classify it.
    pub fn record(&mut self, result: &ExecutionResult) {
        self.received_output = result.received_text().to_owned();
        self.runtime_error = result.runtime_error();
        self.failure = result.failure;
        self.passed = classify(&self.expected_output, &self.received_output, self.runtime_error);
    }
}

fn number_from_id(id: u64) -> u32 {
    u32::try_from(id).unwrap_or(u32::MAX)
}

/// Outputs match when they are equal after dropping trailing whitespace.
pub fn outputs_match(expected: &str, received: &str) -> bool {
    expected.trim_end() == received.trim_end()
}

/// A case passes when outputs match and the run raised nothing.
pub fn classify(expected: &str, received: &str, runtime_error: bool) -> bool {
    !runtime_error && outputs_match(expected, received)
}

/// Resolve and order a page's test cases: by `number`, then by `id`.
pub fn load_test_cases(raw: Vec<RawTestCase>, mode: InputMode) -> Result<Vec<TestCase>, LoadError> {
    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(raw.len());
    for raw_case in raw {
        if !seen.insert(raw_case.id) {
            return Err(LoadError::DuplicateId(raw_case.id));
        }
        cases.push(TestCase::resolve(raw_case, mode)?);
    }
    cases.sort_by_key(|case| (case.number, case.id));
    Ok(cases)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
