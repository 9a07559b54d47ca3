//! Editor model for debugging questions.
//!
//! A debugging question hands the learner buggy code in which the first
//! `read_only_top` and the last `read_only_bottom` lines are locked. When the
//! code ends with a newline, the empty line after it belongs to the bottom
//! lock as well. Lines are indexed from 0.

use std::ops::Range;

use crate::error::EditError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggingEditor {
    initial_code: String,
    lines: Vec<String>,
    read_only_top: usize,
    read_only_bottom: usize,
}

fn split_lines(code: &str) -> Vec<String> {
    code.split('\n').map(str::to_owned).collect()
}

impl DebuggingEditor {
    pub fn new(initial_code: impl Into<String>, read_only_top: usize, read_only_bottom: usize) -> Self {
        let initial_code = initial_code.into();
        Self {
            lines: split_lines(&initial_code),
            initial_code,
            read_only_top,
            read_only_bottom,
        }
    }

    pub fn value(&self) -> String {
        self.lines.join("\n")
    }

    pub fn initial_code(&self) -> &str {
        &self.initial_code
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Lines before the trailing empty line, if there is one.
    fn content_len(&self) -> usize {
        match self.lines.last() {
            Some(last) if last.is_empty() && self.lines.len() > 1 => self.lines.len() - 1,
            _ => self.lines.len(),
        }
    }

    /// Indices of the lines the learner may change.
    pub fn editable_range(&self) -> Range<usize> {
        let end = self.content_len().saturating_sub(self.read_only_bottom);
        let start = self.read_only_top.min(end);
        start..end
    }

    pub fn is_line_editable(&self, index: usize) -> bool {
        self.editable_range().contains(&index)
    }

    /// Replace line `index` with `text`, which may span several lines.
    pub fn replace_line(&mut self, index: usize, text: &str) -> Result<(), EditError> {
        self.check_in_document(index)?;
        if !self.is_line_editable(index) {
            return Err(EditError::ReadOnlyLine { line: index });
        }
        self.lines.splice(index..=index, split_lines(text));
        Ok(())
    }

    /// Insert `text` before line `index`. Inserting right after the last
    /// editable line is allowed.
    pub fn insert_lines(&mut self, index: usize, text: &str) -> Result<(), EditError> {
        if index > self.lines.len() {
            return Err(EditError::OutOfRange {
                line: index,
                len: self.lines.len(),
            });
        }
        let editable = self.editable_range();
        if index < editable.start || index > editable.end {
            return Err(EditError::ReadOnlyLine { line: index });
        }
        self.lines.splice(index..index, split_lines(text));
        Ok(())
    }

    pub fn remove_line(&mut self, index: usize) -> Result<(), EditError> {
        self.check_in_document(index)?;
        if !self.is_line_editable(index) {
            return Err(EditError::ReadOnlyLine { line: index });
        }
        self.lines.remove(index);
        Ok(())
    }

    /// Load a previous attempt. It must keep the locked lines of the
    /// initial code unchanged.
    pub fn restore(&mut self, code: &str) -> Result<(), EditError> {
        let candidate = Self::new(self.initial_code.clone(), self.read_only_top, self.read_only_bottom);
        let attempt = split_lines(code);
        let top = candidate.editable_range().start;
        let bottom = &candidate.lines[candidate.editable_range().end..];

        let top_kept = attempt.len() >= top && attempt[..top] == candidate.lines[..top];
        let bottom_kept = attempt.len() >= top + bottom.len() && attempt.ends_with(bottom);
        if !(top_kept && bottom_kept) {
            return Err(EditError::LockedRegionChanged);
        }
        self.lines = attempt;
        Ok(())
    }

    pub fn reset_to_initial(&mut self) {
        self.lines = split_lines(&self.initial_code);
    }

    fn check_in_document(&self, index: usize) -> Result<(), EditError> {
        if index >= self.lines.len() {
            return Err(EditError::OutOfRange {
                line: index,
                len: self.lines.len(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "def total(items):\n    result = 1\n    for i in items:\n        result += i\n    return result\nprint(total([1, 2]))\n";

    fn editor() -> DebuggingEditor {
        DebuggingEditor::new(CODE, 1, 1)
    }

    // (1) top line, last content line and the trailing empty line are locked
    #[test]
    fn test_locked_ranges() {
        let e = editor();
        assert_eq!(e.line_count(), 7);
        assert_eq!(e.editable_range(), 1..5);
        assert!(!e.is_line_editable(0));
        assert!(e.is_line_editable(1));
        assert!(e.is_line_editable(4));
        assert!(!e.is_line_editable(5));
        assert!(!e.is_line_editable(6));
    }

    // (2) edits inside the unlocked middle succeed
    #[test]
    fn test_fix_the_bug() {
        let mut e = editor();
        e.replace_line(1, "    result = 0").unwrap();
        assert!(e.value().contains("result = 0"));
        assert!(e.value().ends_with("print(total([1, 2]))\n"));
    }

    // (3) edits to locked lines fail
    #[test]
    fn test_locked_edits_rejected() {
        let mut e = editor();
        assert_eq!(
            e.replace_line(0, "def total(xs):"),
            Err(EditError::ReadOnlyLine { line: 0 })
        );
        assert_eq!(e.remove_line(5), Err(EditError::ReadOnlyLine { line: 5 }));
        assert_eq!(
            e.insert_lines(0, "import os"),
            Err(EditError::ReadOnlyLine { line: 0 })
        );
        assert_eq!(
            e.replace_line(40, "x"),
            Err(EditError::OutOfRange { line: 40, len: 7 })
        );
        assert_eq!(e.value(), CODE);
    }

    // (4) insertions shift the bottom lock with the code
    #[test]
    fn test_insert_keeps_bottom_locked() {
        let mut e = editor();
        e.insert_lines(5, "    # done").unwrap();
        assert_eq!(e.editable_range(), 1..6);
        assert_eq!(e.line(6), Some("print(total([1, 2]))"));
        assert!(!e.is_line_editable(6));
    }

    // (5) reset restores the initial code
    #[test]
    fn test_reset_to_initial() {
        let mut e = editor();
        e.replace_line(2, "    pass").unwrap();
        e.reset_to_initial();
        assert_eq!(e.value(), CODE);
    }

    // (6) restoring an attempt checks the locks
    #[test]
    fn test_restore() {
        let mut e = editor();
        let fixed = CODE.replace("result = 1", "result = 0");
        e.restore(&fixed).unwrap();
        assert_eq!(e.value(), fixed);

        let tampered = CODE.replace("print(total([1, 2]))", "print(6)");
        assert_eq!(e.restore(&tampered), Err(EditError::LockedRegionChanged));
        assert_eq!(e.value(), fixed);
    }

    // (7) no locks: everything is editable
    #[test]
    fn test_no_locks() {
        let e = DebuggingEditor::new("a\nb", 0, 0);
        assert_eq!(e.editable_range(), 0..2);
    }
}
