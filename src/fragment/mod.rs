//! Top-level function lookup in a Python source unit
//!
//! Spans are derived from a fresh syntax tree on every call. They describe
//! the text as it was at that moment; after any splice the caller must ask
//! again instead of reusing an old span.

pub mod splice;

use crate::syntax::{self, SyntaxIssue};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tree_sitter::Node;

pub use splice::{join_lines, replace, split_lines};

/// One top-level `def`, 1-based and inclusive on both ends.
///
/// The span starts at the `def` line and ends at the last line of the final
/// body statement. Decorators sit outside it; `decorator_line` records where
/// they begin so callers replacing the function can keep them attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSpan {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decorator_line: Option<usize>,
}

impl FunctionSpan {
    pub fn contains(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// First line of the whole definition, decorators included.
    pub fn outer_start_line(&self) -> usize {
        self.decorator_line.unwrap_or(self.start_line)
    }
}

/// Text of one function together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub span: FunctionSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name(String),
    Line(usize),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(name) => write!(f, "named `{}`", name),
            Target::Line(line) => write!(f, "spanning line {}", line),
        }
    }
}

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("source does not parse: {0}")]
    Syntax(SyntaxIssue),
    #[error("no top-level function {0}")]
    NotFound(Target),
    #[error("invalid line range {start}..={end} for {len} lines")]
    InvalidRange { start: usize, end: usize, len: usize },
}

/// All top-level function definitions, in document order.
pub fn list_functions(source: &str) -> Result<Vec<FunctionSpan>, FragmentError> {
    syntax::check_python(source).map_err(FragmentError::Syntax)?;
    let tree = syntax::parse_python(source).ok_or(FragmentError::Syntax(SyntaxIssue {
        line: 1,
        column: 1,
        missing: false,
    }))?;

    let root = tree.root_node();
    let mut cursor = root.walk();
    let spans = root
        .named_children(&mut cursor)
        .filter_map(|node| function_span(node, source))
        .collect();
    Ok(spans)
}

pub fn extract_by_name(source: &str, name: &str) -> Result<Fragment, FragmentError> {
    let span = list_functions(source)?
        .into_iter()
        .find(|span| span.name == name)
        .ok_or_else(|| FragmentError::NotFound(Target::Name(name.to_string())))?;
    Ok(fragment_for(source, span))
}

pub fn extract_by_line(source: &str, line: usize) -> Result<Fragment, FragmentError> {
    let span = list_functions(source)?
        .into_iter()
        .find(|span| span.contains(line))
        .ok_or(FragmentError::NotFound(Target::Line(line)))?;
    Ok(fragment_for(source, span))
}

fn fragment_for(source: &str, span: FunctionSpan) -> Fragment {
    let lines = split_lines(source);
    let end = span.end_line.min(lines.len());
    let text = join_lines(&lines[span.start_line - 1..end]);
    Fragment { text, span }
}

fn function_span(node: Node<'_>, source: &str) -> Option<FunctionSpan> {
    let (def, decorator_line) = match node.kind() {
        "function_definition" => (node, None),
        "decorated_definition" => (
            node.child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition")?,
            Some(node.start_position().row + 1),
        ),
        _ => return None,
    };

    let name = def
        .child_by_field_name("name")?
        .utf8_text(source.as_bytes())
        .ok()?
        .to_string();

    let start_line = def.start_position().row + 1;
    let end_line = (body_end_row(def) + 1).max(start_line);

    Some(FunctionSpan {
        name,
        start_line,
        end_line,
        decorator_line,
    })
}

/// Row of the last body statement. Trailing comments inside the block are
/// not part of the function.
fn body_end_row(def: Node<'_>) -> usize {
    let Some(body) = def.child_by_field_name("body") else {
        return def.end_position().row;
    };
    let mut cursor = body.walk();
    let last = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .last();
    let node = last.unwrap_or(body);
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}
