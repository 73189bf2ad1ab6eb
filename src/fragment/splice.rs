//! Positional line surgery on a source unit.

use super::FragmentError;

/// Split on `\n` only, so joining with `\n` restores the exact bytes
/// (trailing newline and `\r` included).
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}

/// Replace the 1-based inclusive range `start_line..=end_line` with a single
/// block holding `replacement`. The input is left untouched.
///
/// `end_line` may be one past the last line, in which case the tail is empty.
pub fn replace<S: AsRef<str>>(
    lines: &[S],
    start_line: usize,
    end_line: usize,
    replacement: &str,
) -> Result<Vec<String>, FragmentError> {
    if start_line == 0 || start_line > end_line || end_line > lines.len() + 1 {
        return Err(FragmentError::InvalidRange {
            start: start_line,
            end: end_line,
            len: lines.len(),
        });
    }

    let head = &lines[..start_line - 1];
    let tail = lines.get(end_line..).unwrap_or(&[]);

    let mut out = Vec::with_capacity(head.len() + 1 + tail.len());
    out.extend(head.iter().map(|l| l.as_ref().to_string()));
    out.push(replacement.to_string());
    out.extend(tail.iter().map(|l| l.as_ref().to_string()));
    Ok(out)
}
