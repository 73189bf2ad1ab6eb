//! Tree-sitter based Python parsing
//!
//! One parser per thread, reused across calls. Syntax validity is judged by
//! the absence of ERROR and MISSING nodes in the resulting tree.

use std::cell::RefCell;
use std::fmt;
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - will be caught at parse time if language fails
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Parse `source` with the thread-local Python parser.
pub fn parse_python(source: &str) -> Option<Tree> {
    PYTHON_PARSER.with(|p| p.borrow_mut().parse(source, None))
}

/// Location of the first syntax problem in a source text (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: usize,
    pub column: usize,
    pub missing: bool,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.missing {
            "missing token"
        } else {
            "invalid syntax"
        };
        write!(f, "{} at line {}, column {}", what, self.line, self.column)
    }
}

/// Returns the first syntax problem, or `None` when the text parses cleanly.
pub fn check_python(source: &str) -> Result<(), SyntaxIssue> {
    let Some(tree) = parse_python(source) else {
        return Err(SyntaxIssue {
            line: 1,
            column: 1,
            missing: false,
        });
    };
    match first_error(tree.root_node()) {
        None => Ok(()),
        Some(node) => {
            let pos = node.start_position();
            Err(SyntaxIssue {
                line: pos.row + 1,
                column: pos.column + 1,
                missing: node.is_missing(),
            })
        }
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    // has_error() was set but no child owns it; blame the node itself
    Some(node)
}
