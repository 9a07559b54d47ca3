// pyharness: sandboxed Python test harness for programming-practice questions, on RustPython.

pub mod backend;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod debugging;
pub mod error;
pub mod feedback;
pub mod legacy;
pub mod output;
pub mod parsons;
pub mod question;
pub mod runner;
pub mod session;
pub mod stdin;
pub mod testcase;
pub mod types;
pub(crate) mod vm;
pub mod worker;

pub use backend::{AttemptPayload, AttemptRecorder, AttemptResponse, BackendClient, StyleReport};
pub use config::HarnessConfig;
pub use coordinator::Coordinator;
pub use error::{BackendError, ConfigError, EditError, LayoutError, LoadError, SessionError, StyleCheckError, WorkerError};
pub use feedback::{Banner, RowReport, RowStatus, RunReport};
pub use legacy::{LegacyJudge, RemoteOutcome};
pub use question::{Answer, QuestionPage, QuestionType};
pub use runner::{run_all, Executor, IndentationWarning, RunSummary, NO_CODE_MESSAGE};
pub use session::{QuestionSession, SessionState, StateListener};
pub use stdin::Prompter;
pub use testcase::{InputMode, RawTestCase, TestCase, TestCaseKind};
pub use types::{
    ExecutionRequest, ExecutionResult, FailureKind, SandboxSettings, DEFAULT_ALLOWED_MODULES, DEFAULT_TIMEOUT_MS,
};
