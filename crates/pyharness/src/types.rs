//! Foundational public types shared across the harness.
//!
//! - [`SandboxSettings`]: knobs for the sandbox worker and the coordinator
//! - [`ExecutionRequest`]: one program plus its input mode and time budget
//! - [`ExecutionResult`]: what came back, and why it failed if it did
//! - [`FailureKind`]: the classes of failure a caller can tell apart
//! - [`DEFAULT_ALLOWED_MODULES`]: stdlib modules learner code may import

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard library modules that learner code may import by default.
///
/// Everything else, notably file, network and process modules, raises
/// `ImportError` when imported from learner code. Stdlib modules importing
/// their own dependencies are not affected.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "math",
    "random",
    "string",
    "re",
    "collections",
    "itertools",
    "functools",
    "datetime",
    "time",
    "sys",
    "json",
];

/// Per-run wall-clock budget used by the question pages.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// How long the coordinator waits for a fresh worker to load its runtime.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;

/// Cap on captured stdout + stderr for a single run.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;

/// Compiled programs kept per worker.
pub const DEFAULT_COMPILE_CACHE_SIZE: usize = 256;

/// Configuration for the sandbox worker and its coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Wall-clock budget for one run, in milliseconds.
    pub timeout_ms: u64,
    /// Budget for a freshly spawned worker to report ready, in milliseconds.
    pub ready_timeout_ms: u64,
    /// Maximum bytes of stdout + stderr a single run may produce.
    pub max_output_bytes: usize,
    /// Module names importable from learner code. A dotted name such as
    /// `collections.abc` is allowed when its top-level package is listed.
    pub allowed_modules: Vec<String>,
    /// Entries in each worker's compiled-code cache (minimum 1).
    pub compile_cache_size: usize,
    /// Extra directories holding pure-Python stdlib modules. When empty, the
    /// usual host Python locations are probed.
    #[serde(default)]
    pub stdlib_paths: Vec<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            allowed_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            compile_cache_size: DEFAULT_COMPILE_CACHE_SIZE,
            stdlib_paths: Vec::new(),
        }
    }
}

impl SandboxSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// One program to run in the sandbox.
///
/// `stdin_lines == None` means function mode: `input()` goes to the
/// interactive prompter if one is configured. `Some(lines)` means program
/// mode: each `input()` call consumes the next line and gets `""` once the
/// list is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub user_code: String,
    #[serde(default)]
    pub stdin_lines: Option<Vec<String>>,
    pub timeout_ms: u64,
}

impl ExecutionRequest {
    /// A function-mode request.
    pub fn function(user_code: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            user_code: user_code.into(),
            stdin_lines: None,
            timeout_ms,
        }
    }

    /// A program-mode request fed from `stdin_lines`.
    pub fn program(user_code: impl Into<String>, stdin_lines: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            user_code: user_code.into(),
            stdin_lines: Some(stdin_lines),
            timeout_ms,
        }
    }

    pub fn is_program(&self) -> bool {
        self.stdin_lines.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Why a run did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The learner's code raised, or failed to compile.
    UserCode,
    /// No reply inside the time budget; the worker was replaced.
    Timeout,
    /// The worker crashed, disconnected, or could not be (re)started.
    WorkerFault,
    /// The worker replied with neither output nor error.
    MalformedResult,
}

/// Outcome of one [`ExecutionRequest`].
///
/// Exactly one of `output` / `error` is set. `output == Some("")` is a
/// successful run that printed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            failure: Some(kind),
            duration_ms: 0,
        }
    }

    /// Map a worker reply onto a result. A reply carrying neither field is
    /// reported as [`FailureKind::MalformedResult`].
    pub fn from_reply(output: Option<String>, error: Option<String>) -> Self {
        match (output, error) {
            (_, Some(error)) => Self::failed(FailureKind::UserCode, error),
            (Some(output), None) => Self::success(output),
            (None, None) => Self::failed(
                FailureKind::MalformedResult,
                "Unknown error: no output received",
            ),
        }
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Whether the run counts as a runtime error for test-case purposes.
    pub fn runtime_error(&self) -> bool {
        self.error.is_some()
    }

    /// The text shown as the received output: the output on success, the
    /// error message otherwise.
    pub fn received_text(&self) -> &str {
        self.output
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }
}

/// Render the timeout error for a budget of `timeout_ms`.
///
/// `1000` reads "1 second", other whole seconds read "N seconds", anything
/// else is given in milliseconds.
pub fn timeout_message(timeout_ms: u64) -> String {
    let budget = match timeout_ms {
        1_000 => "1 second".to_owned(),
        ms if ms > 0 && ms % 1_000 == 0 => format!("{} seconds", ms / 1_000),
        ms => format!("{ms} milliseconds"),
    };
    format!("Timeout: Code execution exceeded {budget}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
