//! Sources for the learner's `input()` calls.
//!
//! Program questions feed `input()` from the test case's input text, one
//! line per call, and return `""` once the lines run out so a program that
//! reads too much keeps going instead of hanging. Function questions have no
//! input text; there `input()` is answered by an optional [`Prompter`], and
//! without one it raises `EOFError`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Answers interactive `input(prompt)` calls in function mode.
///
/// Returning `None` signals end of input and surfaces in Python as
/// `EOFError`. Implementations are called from the worker thread.
pub trait Prompter: Send + Sync {
    fn prompt(&self, message: &str) -> Option<String>;
}

impl<F> Prompter for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn prompt(&self, message: &str) -> Option<String> {
        self(message)
    }
}

/// Line queue for program-mode runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StdinFeed {
    lines: VecDeque<String>,
}

impl StdinFeed {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into(),
        }
    }

    /// Split `text` the way [`str::lines`] does: `\n` or `\r\n` separated, no
    /// trailing empty line.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(str::to_owned).collect())
    }

    /// Next line, or `""` once exhausted.
    pub fn next_line(&mut self) -> String {
        self.lines.pop_front().unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

/// What a single run's `input()` reads from.
pub(crate) enum InputSource {
    Lines(StdinFeed),
    Prompt(Arc<dyn Prompter>),
    Closed,
}

impl InputSource {
    pub(crate) fn for_run(stdin_lines: Option<Vec<String>>, prompter: Option<&Arc<dyn Prompter>>) -> Self {
        match (stdin_lines, prompter) {
            (Some(lines), _) => InputSource::Lines(StdinFeed::new(lines)),
            (None, Some(prompter)) => InputSource::Prompt(Arc::clone(prompter)),
            (None, None) => InputSource::Closed,
        }
    }

    /// `None` means end of input.
    pub(crate) fn read(&mut self, prompt: &str) -> Option<String> {
        match self {
            InputSource::Lines(feed) => Some(feed.next_line()),
            InputSource::Prompt(prompter) => prompter.prompt(prompt),
            InputSource::Closed => None,
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Lines(feed) => f.debug_tuple("Lines").field(feed).finish(),
            InputSource::Prompt(_) => f.write_str("Prompt"),
            InputSource::Closed => f.write_str("Closed"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
