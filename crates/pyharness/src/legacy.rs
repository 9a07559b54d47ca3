//! Remote evaluation through the site's judge endpoints.
//!
//! Before the in-page sandbox, code was sent to an external judge and the
//! page polled for the verdict. Some deployments still serve questions this
//! way. A submission is made with `send_code` (or `send_solution` to run the
//! reference answer), then `get_output` is polled until `completed`. The
//! judge's `output` is a JSON document followed by one trailing character.

use std::thread;
use std::time::Duration;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::error::BackendError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_POLLS: u32 = 120;

/// Judge-side id of a submission. Sent back as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionId(pub String);

impl<'de> Deserialize<'de> for SubmissionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => SubmissionId(n.to_string()),
            Raw::Text(s) => SubmissionId(s),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Submitted {
    id: SubmissionId,
}

/// One answer from `get_output`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PollResponse {
    pub completed: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub cmpinfo: String,
}

/// The judge's per-test verdicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteOutput {
    #[serde(default)]
    pub printed: Vec<Value>,
    #[serde(default)]
    pub returned: Vec<Value>,
    #[serde(default)]
    pub correct: Vec<bool>,
    #[serde(default)]
    pub expected_print: Vec<Value>,
    #[serde(default)]
    pub expected_return: Vec<Value>,
}

/// Printed and returned values the learner's code is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub print: String,
    pub returned: String,
}

impl RemoteOutput {
    /// Expectations taken from the first test of a reference run. Missing
    /// values become `None`, as Python would print them.
    pub fn first_expectation(&self) -> ExpectedOutput {
        let first = |values: &[Value]| {
            values
                .first()
                .and_then(display_value)
                .unwrap_or_else(|| "None".to_owned())
        };
        ExpectedOutput {
            print: first(&self.expected_print),
            returned: first(&self.expected_return),
        }
    }

    pub fn printed_text(&self, index: usize) -> Option<String> {
        self.printed.get(index).and_then(display_value)
    }

    pub fn returned_text(&self, index: usize) -> Option<String> {
        self.returned.get(index).and_then(display_value)
    }
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse the judge's `output` field: JSON with one extra trailing character.
pub fn parse_remote_output(raw: &str) -> Result<RemoteOutput, BackendError> {
    let mut chars = raw.chars();
    if chars.next_back().is_none() {
        return Err(BackendError::EmptyOutput);
    }
    Ok(serde_json::from_str(chars.as_str())?)
}

/// Verdict of one remote evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteOutcome {
    pub output: Option<RemoteOutput>,
    pub stderr: String,
    pub cmpinfo: String,
}

impl RemoteOutcome {
    fn from_poll(poll: PollResponse) -> Result<Self, BackendError> {
        let output = if poll.output.is_empty() {
            None
        } else {
            Some(parse_remote_output(&poll.output)?)
        };
        Ok(Self {
            output,
            stderr: poll.stderr,
            cmpinfo: poll.cmpinfo,
        })
    }

    /// Every test correct, and nothing on stderr or from the compiler.
    pub fn all_correct(&self) -> bool {
        let verdicts_ok = self
            .output
            .as_ref()
            .is_some_and(|out| !out.correct.is_empty() && out.correct.iter().all(|&c| c));
        verdicts_ok && self.stderr.is_empty() && self.cmpinfo.is_empty()
    }
}

pub struct LegacyJudge {
    client: BackendClient,
    question_id: u64,
    poll_interval: Duration,
    max_polls: u32,
}

impl LegacyJudge {
    pub fn new(client: BackendClient, question_id: u64) -> Self {
        Self {
            client,
            question_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn question(&self) -> String {
        self.question_id.to_string()
    }

    pub fn send_code(&self, user_input: &str, expected: Option<&ExpectedOutput>) -> Result<SubmissionId, BackendError> {
        let mut fields = vec![
            ("user_input", user_input.to_owned()),
            ("question", self.question()),
        ];
        if let Some(expected) = expected {
            fields.push(("expected_print", expected.print.clone()));
            fields.push(("expected_return", expected.returned.clone()));
        }
        let submitted: Submitted = self.client.post_form("/ajax/send_code/", &fields)?;
        debug!(question = self.question_id, id = %submitted.id.0, "code submitted");
        Ok(submitted.id)
    }

    /// Run the reference solution on `user_input`.
    pub fn send_solution(&self, user_input: &str) -> Result<SubmissionId, BackendError> {
        let fields = [
            ("user_input", user_input.to_owned()),
            ("question", self.question()),
        ];
        let submitted: Submitted = self.client.post_form("/ajax/send_solution/", &fields)?;
        debug!(question = self.question_id, id = %submitted.id.0, "solution submitted");
        Ok(submitted.id)
    }

    pub fn get_output(&self, id: &SubmissionId) -> Result<PollResponse, BackendError> {
        let fields = [("id", id.0.clone()), ("question", self.question())];
        self.client.post_form("/ajax/get_output/", &fields)
    }

    pub fn poll_until_completed(&self, id: &SubmissionId) -> Result<PollResponse, BackendError> {
        for attempt in 1..=self.max_polls {
            let poll = self.get_output(id)?;
            if poll.completed {
                debug!(id = %id.0, attempt, "remote evaluation completed");
                return Ok(poll);
            }
            thread::sleep(self.poll_interval);
        }
        warn!(id = %id.0, polls = self.max_polls, "remote evaluation never completed");
        Err(BackendError::PollExhausted(self.max_polls))
    }

    pub fn save_attempt(&self, user_input: &str, passed_tests: bool, is_save: bool) -> Result<(), BackendError> {
        let fields = [
            ("user_input", user_input.to_owned()),
            ("question", self.question()),
            ("passed_tests", passed_tests.to_string()),
            ("is_save", is_save.to_string()),
        ];
        let _: Value = self.client.post_form("/ajax/save_attempt/", &fields)?;
        Ok(())
    }

    /// Judge the learner's program against the question's stored tests and
    /// record the attempt.
    pub fn evaluate(&self, user_input: &str) -> Result<RemoteOutcome, BackendError> {
        let id = self.send_code(user_input, None)?;
        let outcome = RemoteOutcome::from_poll(self.poll_until_completed(&id)?)?;
        self.record(user_input, &outcome)?;
        Ok(outcome)
    }

    /// Buggy-program questions: the learner supplies an input, the reference
    /// solution is run on it, and the buggy program is then judged against
    /// what the solution printed and returned.
    pub fn check_against_solution(&self, debug_input: &str) -> Result<RemoteOutcome, BackendError> {
        let solution_id = self.send_solution(debug_input)?;
        let solution = self.poll_until_completed(&solution_id)?;
        let expected = parse_remote_output(&solution.output)?.first_expectation();
        debug!(?expected, "reference solution finished");

        let id = self.send_code(debug_input, Some(&expected))?;
        let outcome = RemoteOutcome::from_poll(self.poll_until_completed(&id)?)?;
        self.record(debug_input, &outcome)?;
        Ok(outcome)
    }

    fn record(&self, user_input: &str, outcome: &RemoteOutcome) -> Result<(), BackendError> {
        let passed = outcome.all_correct();
        info!(question = self.question_id, passed, "remote evaluation judged");
        self.save_attempt(user_input, passed, false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // (1) the trailing character is dropped before parsing
    #[test]
    fn test_parse_remote_output() {
        let raw = "{\"printed\": [\"3\\n\", null], \"returned\": [null, 4], \"correct\": [true, false]}\n";
        let out = parse_remote_output(raw).unwrap();
        assert_eq!(out.correct, vec![true, false]);
        assert_eq!(out.printed_text(0).as_deref(), Some("3\n"));
        assert_eq!(out.printed_text(1), None);
        assert_eq!(out.returned_text(1).as_deref(), Some("4"));
    }

    #[test]
    fn test_parse_remote_output_rejects_empty() {
        assert!(matches!(parse_remote_output(""), Err(BackendError::EmptyOutput)));
        assert!(matches!(parse_remote_output("{"), Err(BackendError::Decode(_))));
    }

    // (2) missing reference values are shown as None
    #[test]
    fn test_first_expectation() {
        let out = parse_remote_output("{\"expected_print\": [null], \"expected_return\": [\"7\"]}\n").unwrap();
        assert_eq!(
            out.first_expectation(),
            ExpectedOutput {
                print: "None".into(),
                returned: "7".into()
            }
        );
    }

    // (3) stderr or compiler output fails an otherwise correct run
    #[test]
    fn test_outcome_all_correct() {
        let poll = PollResponse {
            completed: true,
            output: "{\"correct\": [true, true]}\n".into(),
            ..PollResponse::default()
        };
        let outcome = RemoteOutcome::from_poll(poll.clone()).unwrap();
        assert!(outcome.all_correct());

        let noisy = RemoteOutcome::from_poll(PollResponse {
            stderr: "Traceback".into(),
            ..poll
        })
        .unwrap();
        assert!(!noisy.all_correct());

        let empty = RemoteOutcome::from_poll(PollResponse {
            completed: true,
            cmpinfo: "SyntaxError".into(),
            ..PollResponse::default()
        })
        .unwrap();
        assert!(empty.output.is_none());
        assert!(!empty.all_correct());
    }

    #[test]
    fn test_submission_id_forms() {
        let numeric: Submitted = serde_json::from_str("{\"id\": 42}").unwrap();
        let text: Submitted = serde_json::from_str("{\"id\": \"ab12\"}").unwrap();
        assert_eq!(numeric.id, SubmissionId("42".into()));
        assert_eq!(text.id, SubmissionId("ab12".into()));
    }
}
