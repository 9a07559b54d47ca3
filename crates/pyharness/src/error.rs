//! Error types for the harness.
//!
//! Learner-code failures are not errors at this level: they travel inside
//! [`ExecutionResult`](crate::types::ExecutionResult) and end up as failed
//! test cases. The enums here cover the harness's own failure modes.

use std::time::Duration;

use thiserror::Error;

/// Failures of the sandbox worker lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// `initialize` called on a worker that has already been started
    #[error("worker {0} has already been started")]
    AlreadyStarted(u64),

    /// A request was posted before the worker reported ready
    #[error("worker {0} is not ready")]
    NotReady(u64),

    /// A request was posted while another is in flight
    #[error("worker {0} is busy with another request")]
    Busy(u64),

    /// The worker has been terminated and must be replaced
    #[error("worker {0} has been terminated")]
    Terminated(u64),

    /// The OS refused to spawn the worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// The runtime did not load inside the ready budget
    #[error("Python runtime did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    /// The runtime panicked while loading
    #[error("failed to load Python runtime: {0}")]
    RuntimeLoad(String),

    /// A ping went unanswered
    #[error("worker did not answer a ping within {0:?}")]
    Unresponsive(Duration),

    /// The worker thread went away without a fault report
    #[error("worker thread disconnected")]
    Disconnected,
}

/// Failures turning page data into test cases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A test case lacks the field its question type runs from
    #[error("test case {id}: {question_type} questions need `{expected_field}`")]
    MismatchedTestCase {
        id: u64,
        question_type: &'static str,
        expected_field: &'static str,
    },

    /// Two test cases share an id
    #[error("duplicate test case id {0}")]
    DuplicateId(u64),

    /// A field the question type requires is absent
    #[error("{question_type} questions need `{field}`")]
    MissingField {
        question_type: &'static str,
        field: &'static str,
    },

    /// A Parsons layout could not be parsed
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Rejected edits to a debugging question's editor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The target line is in a locked region
    #[error("line {line} is read-only")]
    ReadOnlyLine { line: usize },

    /// The target position lies outside the document
    #[error("line {line} is out of range (document has {len} lines)")]
    OutOfRange { line: usize, len: usize },

    /// A restored attempt does not keep the locked lines intact
    #[error("the read-only lines of the attempt differ from the question's")]
    LockedRegionChanged,
}

/// Rejected Parsons layouts and moves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Indentation is not a multiple of four spaces
    #[error("line {line}: indentation must be a multiple of four spaces")]
    Misaligned { line: usize },

    /// A line is nested more than one level below its predecessor
    #[error("line {line}: unexpected indent")]
    UnexpectedIndent { line: usize },

    /// A pool index or container path does not exist
    #[error("no such position on the board")]
    NoSuchPosition,
}

/// Failures of a question session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation only applies to another question type
    #[error("operation not supported by {0} questions")]
    Unsupported(&'static str),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Failures talking to the question backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level failure
    #[error("request to backend failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("backend returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    /// The body was not the JSON we expected
    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The remote judge never reported completion
    #[error("remote evaluation did not complete after {0} polls")]
    PollExhausted(u32),

    /// The remote judge returned an empty output blob
    #[error("remote evaluation returned no output")]
    EmptyOutput,

    /// The base URL could not be joined with an endpoint path
    #[error("invalid backend URL: {0}")]
    Url(String),
}

/// Rejected style-check submissions, caught before any request is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StyleCheckError {
    #[error("No code submitted!")]
    Empty,

    #[error("Your file is too long! We accept a maximum of {limit} characters, and your code is {actual} characters.")]
    TooLong { limit: usize, actual: usize },

    #[error(transparent)]
    Backend(#[from] BackendErrorMessage),
}

/// A [`BackendError`] flattened to its message so [`StyleCheckError`] stays
/// comparable in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendErrorMessage(pub String);

impl From<BackendError> for StyleCheckError {
    fn from(err: BackendError) -> Self {
        StyleCheckError::Backend(BackendErrorMessage(err.to_string()))
    }
}

/// Invalid harness configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            EditError::ReadOnlyLine { line: 2 }.to_string(),
            "line 2 is read-only"
        );
        assert_eq!(StyleCheckError::Empty.to_string(), "No code submitted!");
        assert_eq!(
            WorkerError::Busy(3).to_string(),
            "worker 3 is busy with another request"
        );
    }

    #[test]
    fn test_backend_error_flattens_into_style_error() {
        let err: StyleCheckError = BackendError::EmptyOutput.into();
        assert_eq!(
            err,
            StyleCheckError::Backend(BackendErrorMessage(
                "remote evaluation returned no output".into()
            ))
        );
    }
}
