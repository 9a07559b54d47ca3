//! One open question page: its test cases, the learner's answer and the
//! executor they run on.
//!
//! A session is created when the page loads and dropped when the learner
//! navigates away. Run and Submit go through [`QuestionSession::on_run_clicked`]
//! and [`QuestionSession::on_submit`]; both leave the latest [`RunReport`]
//! behind for rendering. A [`StateListener`] sees the session go
//! `Running` before the first test case and back to `Idle` after the last,
//! which is when a front end disables and re-enables its Run control.

use tracing::{debug, info, warn};

use crate::backend::{AttemptPayload, AttemptRecorder};
use crate::coordinator::Coordinator;
use crate::debugging::DebuggingEditor;
use crate::error::{LoadError, SessionError};
use crate::feedback::RunReport;
use crate::parsons::ParsonsBoard;
use crate::question::{Answer, QuestionPage, QuestionType};
use crate::runner::{run_all, Executor};
use crate::testcase::{load_test_cases, TestCase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

impl SessionState {
    pub fn run_control_enabled(self) -> bool {
        self == SessionState::Idle
    }
}

/// Told about every state change.
pub type StateListener = Box<dyn FnMut(SessionState)>;

pub struct QuestionSession<E: Executor = Coordinator> {
    question_id: u64,
    question_type: QuestionType,
    test_cases: Vec<TestCase>,
    answer: Answer,
    executor: E,
    timeout_ms: u64,
    recorder: Option<Box<dyn AttemptRecorder>>,
    listener: Option<StateListener>,
    last_report: Option<RunReport>,
}

impl<E: Executor> QuestionSession<E> {
    /// Load a page: resolve its test cases and set up the answer area.
    pub fn open(page: QuestionPage, executor: E, timeout_ms: u64) -> Result<Self, LoadError> {
        let question_type = page.question_type;
        let test_cases = load_test_cases(page.test_cases, question_type.input_mode())?;

        let answer = match question_type {
            QuestionType::Function | QuestionType::Program => Answer::Editor(
                page.previous_code
                    .or(page.initial_code)
                    .unwrap_or_default(),
            ),
            QuestionType::Debugging => {
                let initial = page.initial_code.ok_or(LoadError::MissingField {
                    question_type: question_type.name(),
                    field: "initial_code",
                })?;
                let mut editor =
                    DebuggingEditor::new(initial, page.read_only_lines_top, page.read_only_lines_bottom);
                if let Some(previous) = page.previous_code.as_deref() {
                    if let Err(err) = editor.restore(previous) {
                        warn!(question = page.question_id, %err, "previous attempt not restored");
                    }
                }
                Answer::Debugging(editor)
            }
            QuestionType::Parsons => match page.previous_code.as_deref() {
                Some(previous) => Answer::Parsons(ParsonsBoard::from_layout(previous)?),
                None => {
                    let lines = page.lines.ok_or(LoadError::MissingField {
                        question_type: question_type.name(),
                        field: "lines",
                    })?;
                    Answer::Parsons(ParsonsBoard::new(&lines, &mut rand::rng()))
                }
            },
        };

        info!(
            question = page.question_id,
            question_type = question_type.name(),
            test_cases = test_cases.len(),
            "question loaded"
        );
        Ok(Self {
            question_id: page.question_id,
            question_type,
            test_cases,
            answer,
            executor,
            timeout_ms,
            recorder: None,
            listener: None,
            last_report: None,
        })
    }

    /// Forward submissions to `recorder`.
    pub fn with_recorder(mut self, recorder: Box<dyn AttemptRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_state_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn question_id(&self) -> u64 {
        self.question_id
    }

    pub fn question_type(&self) -> QuestionType {
        self.question_type
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Whether the last run was refused because of tab indentation.
    pub fn indentation_warning(&self) -> bool {
        self.last_report
            .as_ref()
            .is_some_and(|report| report.summary.is_none())
    }

    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    pub fn answer_mut(&mut self) -> &mut Answer {
        &mut self.answer
    }

    /// Replace the answer with `text`. For Parsons questions `text` is an
    /// indented layout; for debugging questions it must keep the locked lines.
    pub fn set_answer_text(&mut self, text: &str) -> Result<(), SessionError> {
        match &mut self.answer {
            Answer::Editor(code) => *code = text.to_owned(),
            Answer::Debugging(editor) => editor.restore(text)?,
            Answer::Parsons(board) => *board = ParsonsBoard::from_layout(text)?,
        }
        Ok(())
    }

    pub fn reset_to_initial(&mut self) -> Result<(), SessionError> {
        match &mut self.answer {
            Answer::Debugging(editor) => {
                editor.reset_to_initial();
                Ok(())
            }
            _ => Err(SessionError::Unsupported(self.question_type.name())),
        }
    }

    /// Run on page load when the answer area already holds code.
    pub fn initial_run(&mut self) -> Option<&RunReport> {
        if !self.answer.has_code() {
            return None;
        }
        debug!(question = self.question_id, "running existing code on load");
        Some(self.on_run_clicked())
    }

    pub fn on_run_clicked(&mut self) -> &RunReport {
        let (report, _) = self.execute();
        self.last_report.insert(report)
    }

    /// Run, then report the attempt. Recording failures are logged and only
    /// leave `attempt` empty.
    pub fn on_submit(&mut self) -> &RunReport {
        let (mut report, user_code) = self.execute();

        if let (Some(recorder), Some(_)) = (self.recorder.as_deref(), report.summary) {
            let payload = AttemptPayload::new(self.question_id, user_code, &self.test_cases);
            match recorder.record_attempt(&payload) {
                Ok(response) => {
                    info!(
                        question = self.question_id,
                        success = response.success,
                        passed = payload.passed_count(),
                        "attempt recorded"
                    );
                    report.attempt = Some(response);
                }
                Err(err) => warn!(question = self.question_id, %err, "failed to record attempt"),
            }
        }
        self.last_report.insert(report)
    }

    /// Run every test case against the current answer.
    fn execute(&mut self) -> (RunReport, String) {
        self.notify(SessionState::Running);

        let user_code = self.answer.user_code();
        let report = match run_all(&mut self.test_cases, &user_code, &mut self.executor, self.timeout_ms) {
            Ok(summary) => RunReport::from_run(summary, &self.test_cases, &user_code),
            Err(_) => RunReport::indentation_warning(&self.test_cases, &user_code),
        };

        self.notify(SessionState::Idle);
        (report, user_code)
    }

    fn notify(&mut self, state: SessionState) {
        if let Some(listener) = self.listener.as_mut() {
            listener(state);
        }
    }

    /// Leave the page, handing back the executor.
    pub fn close(self) -> E {
        debug!(question = self.question_id, "question closed");
        self.executor
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
