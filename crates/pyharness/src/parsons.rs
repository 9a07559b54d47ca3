//! Board model for Parsons questions.
//!
//! The learner drags shuffled source lines from a pool into a solution area.
//! Every placed line can hold its own nested lines, which is how blocks are
//! expressed, so the solution is a tree. Code is rebuilt from it depth first:
//! top-level lines get no indent and each level of nesting adds four spaces.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::error::LayoutError;

const INDENT: &str = "    ";

/// A placed line and the lines nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsonsLine {
    pub content: String,
    pub children: Vec<ParsonsLine>,
}

impl ParsonsLine {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into().trim().to_owned(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ParsonsLine>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsonsBoard {
    pool: Vec<String>,
    placed: Vec<ParsonsLine>,
}

impl ParsonsBoard {
    /// A board whose pool holds the non-blank lines of `source`, trimmed and
    /// shuffled with `rng`.
    pub fn new<R: Rng + ?Sized>(source: &str, rng: &mut R) -> Self {
        let mut pool: Vec<String> = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        pool.shuffle(rng);
        Self {
            pool,
            placed: Vec::new(),
        }
    }

    /// A board with an empty pool and `layout` already placed. Each level of
    /// indentation is four spaces; blank lines are skipped.
    pub fn from_layout(layout: &str) -> Result<Self, LayoutError> {
        let mut placed = Vec::new();
        let mut previous_depth: Option<usize> = None;

        for (index, raw) in layout.lines().enumerate() {
            let line_number = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let indent = raw.len() - raw.trim_start_matches(' ').len();
            if raw[indent..].starts_with('\t') || indent % INDENT.len() != 0 {
                return Err(LayoutError::Misaligned { line: line_number });
            }
            let depth = indent / INDENT.len();
            let max_depth = previous_depth.map_or(0, |d| d + 1);
            if depth > max_depth {
                return Err(LayoutError::UnexpectedIndent { line: line_number });
            }

            let container = container_at_depth(&mut placed, depth)
                .ok_or(LayoutError::UnexpectedIndent { line: line_number })?;
            container.push(ParsonsLine::new(raw));
            previous_depth = Some(depth);
        }

        Ok(Self {
            pool: Vec::new(),
            placed,
        })
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    pub fn placed(&self) -> &[ParsonsLine] {
        &self.placed
    }

    /// Move pool line `pool_index` to the end of the container at `path`.
    ///
    /// `path` lists child indices from the top level down; an empty path is
    /// the top-level container, `[0]` the lines nested under the first
    /// top-level line, and so on.
    pub fn place(&mut self, pool_index: usize, path: &[usize]) -> Result<(), LayoutError> {
        if pool_index >= self.pool.len() {
            return Err(LayoutError::NoSuchPosition);
        }
        let container = container_at_path(&mut self.placed, path).ok_or(LayoutError::NoSuchPosition)?;
        let content = self.pool.remove(pool_index);
        container.push(ParsonsLine::new(content));
        Ok(())
    }

    /// Rebuild the program text, one `\n`-terminated line per placed line.
    pub fn to_code(&self) -> String {
        let mut code = String::new();
        write_lines(&self.placed, 0, &mut code);
        code
    }
}

fn write_lines(lines: &[ParsonsLine], depth: usize, out: &mut String) {
    for line in lines {
        out.push_str(&INDENT.repeat(depth));
        out.push_str(&line.content);
        out.push('\n');
        write_lines(&line.children, depth + 1, out);
    }
}

/// The container `depth` levels down, following the last line each time.
fn container_at_depth(roots: &mut Vec<ParsonsLine>, depth: usize) -> Option<&mut Vec<ParsonsLine>> {
    let mut container = roots;
    for _ in 0..depth {
        container = &mut container.last_mut()?.children;
    }
    Some(container)
}

fn container_at_path<'a>(
    roots: &'a mut Vec<ParsonsLine>,
    path: &[usize],
) -> Option<&'a mut Vec<ParsonsLine>> {
    let mut container = roots;
    for &index in path {
        container = &mut container.get_mut(index)?.children;
    }
    Some(container)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SOURCE: &str = "def count_down(n):\n    while n > 0:\n        print(n)\n        n -= 1\n    print('Go!')\n";

    // (1) nesting depth becomes four spaces per level
    #[test]
    fn test_to_code_indents_by_depth() {
        let board = ParsonsBoard {
            pool: Vec::new(),
            placed: vec![ParsonsLine::new("def f():").with_children(vec![
                ParsonsLine::new("for i in range(2):")
                    .with_children(vec![ParsonsLine::new("print(i)")]),
                ParsonsLine::new("return 1"),
            ])],
        };
        assert_eq!(
            board.to_code(),
            "def f():\n    for i in range(2):\n        print(i)\n    return 1\n"
        );
    }

    // (2) a layout reads back to the same code
    #[test]
    fn test_from_layout() {
        let board = ParsonsBoard::from_layout(SOURCE).unwrap();
        assert_eq!(board.to_code(), SOURCE);
        assert_eq!(board.placed().len(), 1);
        assert_eq!(board.placed()[0].children.len(), 2);
    }

    // (3) malformed layouts are rejected with the offending line
    #[test]
    fn test_bad_layouts() {
        assert_eq!(
            ParsonsBoard::from_layout("x = 1\n  y = 2"),
            Err(LayoutError::Misaligned { line: 2 })
        );
        assert_eq!(
            ParsonsBoard::from_layout("x = 1\n        y = 2"),
            Err(LayoutError::UnexpectedIndent { line: 2 })
        );
        assert_eq!(
            ParsonsBoard::from_layout("    x = 1"),
            Err(LayoutError::UnexpectedIndent { line: 1 })
        );
    }

    // (4) the pool is the trimmed source lines in some order
    #[test]
    fn test_pool_is_shuffled_source() {
        let mut rng = StdRng::seed_from_u64(7);
        let board = ParsonsBoard::new(SOURCE, &mut rng);
        let mut pool = board.pool().to_vec();
        pool.sort();
        let mut expected: Vec<String> = SOURCE.lines().map(|l| l.trim().to_owned()).collect();
        expected.sort();
        assert_eq!(pool, expected);
        assert!(board.placed().is_empty());
    }

    // (5) placing lines builds the tree
    #[test]
    fn test_place_lines() {
        let mut board = ParsonsBoard {
            pool: vec!["print(n)".into(), "def show(n):".into()],
            placed: Vec::new(),
        };
        board.place(1, &[]).unwrap();
        board.place(0, &[0]).unwrap();
        assert!(board.pool().is_empty());
        assert_eq!(board.to_code(), "def show(n):\n    print(n)\n");
        assert_eq!(board.place(0, &[]), Err(LayoutError::NoSuchPosition));
    }

    #[test]
    fn test_place_into_missing_container() {
        let mut board = ParsonsBoard {
            pool: vec!["x".into()],
            placed: Vec::new(),
        };
        assert_eq!(board.place(0, &[3]), Err(LayoutError::NoSuchPosition));
        assert_eq!(board.pool().len(), 1);
    }
}
