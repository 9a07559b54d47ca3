//! Question page data and the learner's answer for each question type.

use serde::{Deserialize, Serialize};

use crate::debugging::DebuggingEditor;
use crate::parsons::ParsonsBoard;
use crate::testcase::{InputMode, RawTestCase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Write a function; test code calls it.
    Function,
    /// Write a whole program; tests feed it stdin.
    Program,
    /// Fix the unlocked middle of a buggy program.
    Debugging,
    /// Arrange shuffled lines into a program.
    Parsons,
}

impl QuestionType {
    pub fn input_mode(self) -> InputMode {
        match self {
            QuestionType::Program => InputMode::Program,
            QuestionType::Function | QuestionType::Debugging | QuestionType::Parsons => {
                InputMode::CodeCompletion
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QuestionType::Function => "function",
            QuestionType::Program => "program",
            QuestionType::Debugging => "debugging",
            QuestionType::Parsons => "parsons",
        }
    }
}

/// Data rendered into a question page by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPage {
    pub question_id: u64,
    pub question_type: QuestionType,
    #[serde(default)]
    pub test_cases: Vec<RawTestCase>,
    #[serde(default)]
    pub initial_code: Option<String>,
    #[serde(default)]
    pub read_only_lines_top: usize,
    #[serde(default)]
    pub read_only_lines_bottom: usize,
    /// Source lines of a Parsons question.
    #[serde(default)]
    pub lines: Option<String>,
    /// The learner's last saved attempt.
    #[serde(default)]
    pub previous_code: Option<String>,
}

/// The learner's current answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Editor(String),
    Debugging(DebuggingEditor),
    Parsons(ParsonsBoard),
}

impl Answer {
    /// The code the tests run against.
    pub fn user_code(&self) -> String {
        match self {
            Answer::Editor(code) => code.clone(),
            Answer::Debugging(editor) => editor.value(),
            Answer::Parsons(board) => board.to_code(),
        }
    }

    pub fn has_code(&self) -> bool {
        match self {
            Answer::Editor(code) => !code.trim().is_empty(),
            Answer::Debugging(editor) => !editor.value().trim().is_empty(),
            Answer::Parsons(board) => !board.placed().is_empty(),
        }
    }
}
