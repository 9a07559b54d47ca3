//! Running a question's test cases against the learner's code.
//!
//! Test cases run one after another, in order, through an [`Executor`]. One
//! case failing, timing out or crashing the worker never stops the rest.
//! Blank code is never sent to the executor; every case fails with
//! [`NO_CODE_MESSAGE`] instead.

use serde::Serialize;
use tracing::{debug, info};

use crate::testcase::TestCase;
use crate::types::{ExecutionRequest, ExecutionResult, FailureKind};

/// Anything that can run a single program to completion.
pub trait Executor {
    fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult {
        (**self).run_one(request)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult {
        (**self).run_one(request)
    }
}

/// The learner's code contains a tab character. Nothing was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndentationWarning;

/// Counts over one run of all test cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub runtime_errors: usize,
    pub timeouts: usize,
    pub worker_faults: usize,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    /// `true` when every case passed. A question with no cases has nothing
    /// to pass.
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    fn count(&mut self, case: &TestCase) {
        self.total += 1;
        if case.passed() {
            self.passed += 1;
        }
        if case.runtime_error() {
            self.runtime_errors += 1;
        }
        match case.failure() {
            Some(FailureKind::Timeout) => self.timeouts += 1,
            Some(FailureKind::WorkerFault) => self.worker_faults += 1,
            _ => {}
        }
    }
}

/// Received output of every case when the answer is blank.
pub const NO_CODE_MESSAGE: &str = "No Python code provided.";

pub fn contains_tabs(code: &str) -> bool {
    code.contains('\t')
}

/// Reset every case, then run each against `user_code`.
///
/// Code containing a tab is refused before anything runs; the cases are
/// still reset.
pub fn run_all<E>(
    cases: &mut [TestCase],
    user_code: &str,
    executor: &mut E,
    timeout_ms: u64,
) -> Result<RunSummary, IndentationWarning>
where
    E: Executor + ?Sized,
{
    cases.iter_mut().for_each(TestCase::reset);

    if contains_tabs(user_code) {
        info!("code contains tabs; not running");
        return Err(IndentationWarning);
    }

    let blank = user_code.trim().is_empty();
    if blank {
        debug!("no code to run");
    }

    let mut summary = RunSummary::default();
    for case in cases.iter_mut() {
        let result = if blank {
            ExecutionResult::failed(FailureKind::UserCode, NO_CODE_MESSAGE)
        } else {
            executor.run_one(&case.request(user_code, timeout_ms))
        };
        case.record(&result);
        debug!(
            test_case = case.id(),
            passed = case.passed(),
            duration_ms = result.duration_ms,
            "test case finished"
        );
        summary.count(case);
    }
    info!(
        total = summary.total,
        passed = summary.passed,
        "test run complete"
    );
    Ok(summary)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned results and records what it was asked to run.
    struct Scripted {
        results: VecDeque<ExecutionResult>,
        seen: Vec<ExecutionRequest>,
    }

    impl Scripted {
        fn new(results: Vec<ExecutionResult>) -> Self {
            Self {
                results: results.into(),
                seen: Vec::new(),
            }
        }
    }

    impl Executor for Scripted {
        fn run_one(&mut self, request: &ExecutionRequest) -> ExecutionResult {
            self.seen.push(request.clone());
            self.results
                .pop_front()
                .unwrap_or_else(|| ExecutionResult::success(""))
        }
    }

    fn cases() -> Vec<TestCase> {
        vec![
            TestCase::code_completion(1, "print(add(1, 1))", "2\n"),
            TestCase::code_completion(2, "print(add(2, 3))", "5\n"),
            TestCase::code_completion(3, "print(add(0, 0))", "0\n"),
        ]
    }

    // (1) each case is classified independently and in order
    #[test]
    fn test_run_all_mixed_outcomes() {
        let mut executor = Scripted::new(vec![
            ExecutionResult::success("2\n"),
            ExecutionResult::failed(FailureKind::Timeout, "Timeout: Code execution exceeded 1 second"),
            ExecutionResult::success("0"),
        ]);
        let mut cases = cases();
        let summary = run_all(&mut cases, "def add(a, b): return a + b", &mut executor, 1_000)
            .expect("no tabs");

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.timeouts, 1);
        assert!(!summary.all_passed());
        assert!(cases[0].passed());
        assert!(!cases[1].passed());
        assert!(cases[2].passed());
        assert_eq!(executor.seen.len(), 3);
        assert!(executor.seen[1].user_code.ends_with("\nprint(add(2, 3))"));
    }

    // (2) tabs block the run but reset the cases
    #[test]
    fn test_tabs_block_run() {
        let mut executor = Scripted::new(vec![]);
        let mut cases = cases();
        cases[0].record(&ExecutionResult::success("2"));
        assert!(cases[0].passed());

        let outcome = run_all(&mut cases, "def add(a, b):\n\treturn a + b", &mut executor, 1_000);
        assert_eq!(outcome, Err(IndentationWarning));
        assert!(executor.seen.is_empty());
        assert!(cases.iter().all(|c| !c.passed()));
    }

    // (3) running twice gives the same verdicts
    #[test]
    fn test_rerun_is_idempotent() {
        let mut cases = cases();
        let results = || {
            vec![
                ExecutionResult::success("2\n"),
                ExecutionResult::success("6\n"),
                ExecutionResult::success("0\n"),
            ]
        };
        let first = run_all(&mut cases, "code", &mut Scripted::new(results()), 1_000).unwrap();
        let verdicts: Vec<bool> = cases.iter().map(TestCase::passed).collect();
        let second = run_all(&mut cases, "code", &mut Scripted::new(results()), 1_000).unwrap();
        assert_eq!(first, second);
        assert_eq!(verdicts, cases.iter().map(TestCase::passed).collect::<Vec<_>>());
    }

    // (4) blank code fails every case without reaching the executor
    #[test]
    fn test_blank_code_is_not_run() {
        let mut executor = Scripted::new(vec![]);
        let mut cases = cases();
        let summary = run_all(&mut cases, " \n\n  ", &mut executor, 1_000).expect("no tabs");

        assert!(executor.seen.is_empty());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.runtime_errors, 3);
        for case in &cases {
            assert!(case.runtime_error());
            assert_eq!(case.received_output(), NO_CODE_MESSAGE);
        }
    }

    // (5) no cases never counts as all passed
    #[test]
    fn test_empty_is_not_all_passed() {
        let mut none: Vec<TestCase> = Vec::new();
        let summary = run_all(&mut none, "x", &mut Scripted::new(vec![]), 1_000).unwrap();
        assert!(!summary.all_passed());
    }
}
