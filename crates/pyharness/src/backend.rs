//! Client for the question site's AJAX endpoints.
//!
//! Every call is a POST carrying the page's CSRF token. JSON endpoints get
//! it in the `X-CSRFToken` header; the older form endpoints used by
//! [`crate::legacy`] send it as a `csrfmiddlewaretoken` field.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BackendError, StyleCheckError};
use crate::testcase::{TestCase, TestCaseKind};

const CSRF_HEADER: &str = "X-CSRFToken";
const CSRF_FIELD: &str = "csrfmiddlewaretoken";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest submission the style checker accepts, in characters.
pub const STYLE_MAX_CHARACTERS: usize = 10_000;

/// One test case's outcome as reported with an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedTestCase {
    pub id: u64,
    pub passed: bool,
    pub received_output: String,
    pub expected_output: String,
    pub runtime_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_input: Option<String>,
}

impl From<&TestCase> for SubmittedTestCase {
    fn from(case: &TestCase) -> Self {
        let (test_code, test_input) = match case.kind() {
            TestCaseKind::CodeCompletion { append_code } => (Some(append_code.clone()), None),
            TestCaseKind::Program { stdin_lines } => (None, Some(stdin_lines.join("\n"))),
        };
        Self {
            id: case.id(),
            passed: case.passed(),
            received_output: case.received_output().to_owned(),
            expected_output: case.expected_output().to_owned(),
            runtime_error: case.runtime_error(),
            test_code,
            test_input,
        }
    }
}

/// Body of `save_question_attempt`. Test cases are keyed by their id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptPayload {
    pub user_input: String,
    pub question: u64,
    pub test_cases: BTreeMap<String, SubmittedTestCase>,
}

impl AttemptPayload {
    pub fn new(question_id: u64, user_input: impl Into<String>, cases: &[TestCase]) -> Self {
        Self {
            user_input: user_input.into(),
            question: question_id,
            test_cases: cases
                .iter()
                .map(|case| (case.id().to_string(), SubmittedTestCase::from(case)))
                .collect(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.test_cases.values().filter(|case| case.passed).count()
    }
}

/// The backend's answer to a saved attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub curr_points: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub point_diff: Option<i64>,
    #[serde(default)]
    pub achievements: Vec<String>,
}

/// Points arrive as numbers or as numeric strings depending on the view.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(i64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse().map(Some).map_err(de::Error::custom)
        }
    }
}

/// Style checker results. Older deployments render the report server side;
/// newer ones return one HTML fragment per problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleReport {
    Rendered {
        success: bool,
        #[serde(default)]
        result_html: String,
        #[serde(default)]
        result_text: String,
    },
    Feedback {
        feedback_html: Vec<String>,
        error_count: u32,
    },
}

impl StyleReport {
    pub fn is_clean(&self) -> bool {
        match self {
            StyleReport::Rendered { success, .. } => *success,
            StyleReport::Feedback { error_count, .. } => *error_count == 0,
        }
    }
}

#[derive(Serialize)]
struct StyleRequest<'a> {
    user_code: &'a str,
    language: &'static str,
}

/// Reject code the style checker would refuse, without a round trip.
pub fn check_style_preflight(code: &str) -> Result<(), StyleCheckError> {
    if code.trim().is_empty() {
        return Err(StyleCheckError::Empty);
    }
    let actual = code.chars().count();
    if actual > STYLE_MAX_CHARACTERS {
        return Err(StyleCheckError::TooLong {
            limit: STYLE_MAX_CHARACTERS,
            actual,
        });
    }
    Ok(())
}

/// Somewhere attempts can be saved.
pub trait AttemptRecorder {
    fn record_attempt(&self, payload: &AttemptPayload) -> Result<AttemptResponse, BackendError>;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    csrf_token: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, csrf_token: impl Into<String>) -> Result<Self, BackendError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(BackendError::Url(base_url));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            csrf_token: csrf_token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST `body` as JSON to `/ajax/{name}/`.
    fn ajax<B, R>(&self, name: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.post_json(&format!("/ajax/{name}/"), body)
    }

    pub(crate) fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.url(path))
            .header(CSRF_HEADER, &self.csrf_token)
            .json(body);
        self.send(path, request)
    }

    /// POST url-encoded `fields` plus the CSRF field.
    pub(crate) fn post_form<R>(&self, path: &str, fields: &[(&str, String)]) -> Result<R, BackendError>
    where
        R: DeserializeOwned,
    {
        let mut form: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push((CSRF_FIELD, &self.csrf_token));
        let request = self.client.post(self.url(path)).form(&form);
        self.send(path, request)
    }

    fn send<R: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<R, BackendError> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            warn!(path, status = status.as_u16(), "backend request rejected");
            return Err(BackendError::Status {
                path: path.to_owned(),
                status: status.as_u16(),
            });
        }
        let body = response.text()?;
        debug!(path, bytes = body.len(), "backend response");
        Ok(serde_json::from_str(&body)?)
    }

    pub fn save_question_attempt(&self, payload: &AttemptPayload) -> Result<AttemptResponse, BackendError> {
        let response: AttemptResponse = self.ajax("save_question_attempt", payload)?;
        if let Some(message) = &response.message {
            debug!(question = payload.question, message, "attempt saved");
        }
        Ok(response)
    }

    pub fn check_style(&self, code: &str) -> Result<StyleReport, StyleCheckError> {
        check_style_preflight(code)?;
        let body = StyleRequest {
            user_code: code,
            language: "python3",
        };
        Ok(self.post_json("/style/ajax/check/", &body)?)
    }
}

impl AttemptRecorder for BackendClient {
    fn record_attempt(&self, payload: &AttemptPayload) -> Result<AttemptResponse, BackendError> {
        self.save_question_attempt(payload)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
