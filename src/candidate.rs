//! Candidate rewrites and their validation
//!
//! Oracle output often arrives wrapped in markdown fences, sometimes with a
//! trailing explanation after the closing fence. Cleaning strips the opening
//! fence lines and everything from the last closing fence onwards; what sits
//! in between is kept verbatim. Validation then requires the cleaned text to
//! parse. Formatting is deliberately not part of this step.

use crate::syntax::{self, SyntaxIssue};
use serde::Serialize;

/// One oracle rewrite attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub index: usize,
    pub temperature: f32,
    /// Cleaned text (raw text when cleaning never ran because it was empty).
    pub text: String,
    pub valid: bool,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub cleaned: String,
    pub issue: Option<SyntaxIssue>,
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim();
    match trimmed.strip_prefix("```") {
        Some(tag) => tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '+'),
        None => false,
    }
}

fn is_closing_fence(line: &str) -> bool {
    line.trim() == "```"
}

/// Remove generation artifacts from raw oracle text. Text without any fence
/// line is returned as is; once a fence was removed, blank lines before the
/// code and trailing whitespace after it go too.
pub fn clean(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();

    let leading = lines.iter().take_while(|l| is_fence(l)).count();
    lines.drain(..leading);

    let closing = lines.iter().rposition(|l| is_closing_fence(l));
    if let Some(last) = closing {
        lines.truncate(last);
    }
    if leading == 0 && closing.is_none() {
        return raw.to_string();
    }

    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines[start..].join("\n").trim_end().to_string()
}

/// Clean `raw_text` and check that the result parses.
pub fn validate(raw_text: &str) -> Validation {
    let cleaned = clean(raw_text);
    match syntax::check_python(&cleaned) {
        Ok(()) => Validation {
            ok: true,
            cleaned,
            issue: None,
        },
        Err(issue) => Validation {
            ok: false,
            cleaned,
            issue: Some(issue),
        },
    }
}
