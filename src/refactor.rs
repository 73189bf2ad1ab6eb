//! Targeted single-function refactor
//!
//! One function is cut out of the file, sent to the oracle on its own, and
//! the answer spliced back where the function was. The oracle call runs
//! under a timeout; when it expires the request future is dropped and the
//! file is left alone. Nothing is written unless every step succeeded.

use crate::candidate;
use crate::fragment::{self, FragmentError, FunctionSpan};
use crate::oracle::{CandidateGenerator, Oracle};
use crate::prompt;
use crate::syntax::{self, SyntaxIssue};
use crate::util::write_atomic;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RefactorSettings {
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for RefactorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Error)]
pub enum RefactorError {
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("oracle did not answer within {secs}s")]
    Timeout { secs: u64 },
    #[error("oracle returned no code")]
    EmptyResponse,
    #[error("refactored code does not parse: {0}")]
    InvalidSyntax(SyntaxIssue),
    #[error("refactored code no longer defines `{name}`, cannot keep its decorators")]
    LostFunction { name: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RefactorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RefactorError::Fragment(FragmentError::NotFound(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorReport {
    pub name: String,
    /// Span the function occupied when it was spliced.
    pub replaced: FunctionSpan,
    pub lines_before: usize,
    pub lines_after: usize,
}

pub struct Refactorer<'a> {
    generator: CandidateGenerator<'a>,
    settings: RefactorSettings,
}

impl<'a> Refactorer<'a> {
    pub fn new(oracle: &'a dyn Oracle, settings: RefactorSettings) -> Self {
        Self {
            generator: CandidateGenerator::new(oracle),
            settings,
        }
    }

    /// Refactor the top-level function `name` in place.
    pub async fn refactor_function(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<RefactorReport, RefactorError> {
        let source = fs::read_to_string(path)?;
        let fragment = fragment::extract_by_name(&source, name)?;
        let prompt = prompt::refactor_prompt(name, &fragment.text);

        info!(function = name, path = %path.display(), "requesting refactor");
        let raw = tokio::time::timeout(
            self.settings.timeout,
            self.generator.generate(&prompt, self.settings.temperature),
        )
        .await
        .map_err(|_| {
            warn!(function = name, secs = self.settings.timeout.as_secs(), "refactor timed out");
            RefactorError::Timeout {
                secs: self.settings.timeout.as_secs(),
            }
        })?;

        if raw.trim().is_empty() {
            return Err(RefactorError::EmptyResponse);
        }
        let validation = candidate::validate(&raw);
        if let Some(issue) = validation.issue {
            warn!(function = name, %issue, "refactored code has syntax errors");
            return Err(RefactorError::InvalidSyntax(issue));
        }
        if validation.cleaned.trim().is_empty() {
            return Err(RefactorError::EmptyResponse);
        }

        // The file may have changed while we waited; locate the function again.
        let current = fs::read_to_string(path)?;
        let span = fragment::extract_by_name(&current, name)?.span;
        let lines = fragment::split_lines(&current);
        let replacement = match span.decorator_line {
            Some(first) => reattach_decorators(&lines[first - 1..span.start_line - 1], &validation.cleaned, name)?,
            None => code_block(&validation.cleaned).to_string(),
        };
        let updated = fragment::replace(&lines, span.outer_start_line(), span.end_line, &replacement)?;
        let new_source = fragment::join_lines(&updated);

        syntax::check_python(&new_source).map_err(RefactorError::InvalidSyntax)?;
        write_atomic(path, &new_source)?;

        let report = RefactorReport {
            name: name.to_string(),
            lines_before: lines.len(),
            lines_after: fragment::split_lines(&new_source).len(),
            replaced: span,
        };
        info!(
            function = name,
            start = report.replaced.start_line,
            end = report.replaced.end_line,
            lines_after = report.lines_after,
            "function replaced"
        );
        Ok(report)
    }

    /// Refactor whichever top-level function spans `line`.
    pub async fn refactor_at_line(
        &self,
        path: &Path,
        line: usize,
    ) -> Result<RefactorReport, RefactorError> {
        let source = fs::read_to_string(path)?;
        let name = fragment::extract_by_line(&source, line)?.span.name;
        self.refactor_function(path, &name).await
    }

    /// Refactor several functions one after another. Each one is located
    /// afresh, so earlier splices never leave later spans stale.
    pub async fn refactor_functions(
        &self,
        path: &Path,
        names: &[String],
    ) -> Vec<(String, Result<RefactorReport, RefactorError>)> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = self.refactor_function(path, name).await;
            if let Err(err) = &result {
                warn!(function = %name, error = %err, "refactor skipped");
            }
            results.push((name.clone(), result));
        }
        results
    }
}

/// Code without blank lines before it or whitespace after it.
fn code_block(code: &str) -> &str {
    code.trim_start_matches(['\n', '\r']).trim_end()
}

/// Put the original decorator lines back above the definition of `name`.
/// The oracle only ever sees the bare `def`, so any helpers it adds must
/// stay undecorated.
fn reattach_decorators(
    decorators: &[&str],
    code: &str,
    name: &str,
) -> Result<String, RefactorError> {
    let code = code_block(code);
    let target = fragment::list_functions(code)?
        .into_iter()
        .find(|span| span.name == name)
        .ok_or_else(|| RefactorError::LostFunction {
            name: name.to_string(),
        })?;

    let lines = fragment::split_lines(code);
    let at = target.outer_start_line() - 1;
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + decorators.len());
    out.extend_from_slice(&lines[..at]);
    out.extend_from_slice(decorators);
    out.extend_from_slice(&lines[at..]);
    Ok(fragment::join_lines(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Target;
    use crate::testing::ScriptedOracle;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const SOURCE: &str = "\
import math


def area(r):
    return math.pi * r * r


def report(items):
    total = 0
    for item in items:
        total += item
    print(total)
    return total
";

    fn write(dir: &Path) -> PathBuf {
        let path = dir.join("shapes.py");
        fs::write(&path, SOURCE).unwrap();
        path
    }

    fn settings(timeout: Duration) -> RefactorSettings {
        RefactorSettings {
            timeout,
            temperature: 0.7,
        }
    }

    #[test]
    fn splices_refactored_function_in_place() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new([
            "```python\ndef _sum(items):\n    return sum(items)\n\n\ndef report(items):\n    total = _sum(items)\n    print(total)\n    return total\n```",
        ]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(refactorer.refactor_function(&path, "report")).unwrap();

        assert_eq!(report.replaced.start_line, 8);
        assert_eq!(report.replaced.end_line, 13);
        let updated = fs::read_to_string(&path).unwrap();
        assert!(updated.starts_with("import math\n\n\ndef area(r):\n    return math.pi * r * r\n\n\ndef _sum(items):"));
        assert!(updated.ends_with("    return total\n"));
        let names: Vec<String> = fragment::list_functions(&updated)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["area", "_sum", "report"]);
        assert_eq!(oracle.temperatures(), vec![0.7]);
    }

    #[test]
    fn slow_oracle_times_out_and_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new(["def report(items):\n    return 0"])
            .with_delay(Duration::from_secs(5));
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_millis(50)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(refactorer.refactor_function(&path, "report"))
            .unwrap_err();

        assert!(matches!(err, RefactorError::Timeout { .. }));
        assert_eq!(fs::read(&path).unwrap(), SOURCE.as_bytes());
    }

    #[test]
    fn unknown_function_is_not_found_without_oracle_call() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new(["x = 1"]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(refactorer.refactor_function(&path, "volume"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(oracle.calls(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), SOURCE);
    }

    #[test]
    fn invalid_syntax_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new(["def report(items:\n    return 0"]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(refactorer.refactor_function(&path, "report"))
            .unwrap_err();
        assert!(matches!(err, RefactorError::InvalidSyntax(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), SOURCE);
    }

    #[test]
    fn empty_response_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::failing("no candidates");
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(refactorer.refactor_function(&path, "area"))
            .unwrap_err();
        assert!(matches!(err, RefactorError::EmptyResponse));
        assert_eq!(fs::read_to_string(&path).unwrap(), SOURCE);
    }

    #[test]
    fn batch_relocates_after_each_splice() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new([
            // area grows by several lines, shifting report down
            "def _square(r):\n    return r * r\n\n\ndef area(r):\n    return math.pi * _square(r)",
            "def report(items):\n    total = sum(items)\n    print(total)\n    return total",
        ]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let results = rt.block_on(
            refactorer.refactor_functions(&path, &["area".to_string(), "report".to_string()]),
        );
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        let second = results[1].1.as_ref().unwrap();
        assert_eq!(second.replaced.start_line, 12);

        let updated = fs::read_to_string(&path).unwrap();
        assert!(updated.contains("    return math.pi * _square(r)\n\n\ndef report(items):\n    total = sum(items)"));
        assert!(!updated.contains("for item in items"));
    }

    const DECORATED: &str = "\
import functools


@functools.lru_cache()
def double(n):
    return n * 2
";

    #[test]
    fn decorators_stay_on_the_refactored_function() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cached.py");
        fs::write(&path, DECORATED).unwrap();
        let oracle = ScriptedOracle::new([
            "def _twice(n):\n    return n + n\n\n\ndef double(n):\n    return _twice(n)\n",
        ]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(refactorer.refactor_function(&path, "double")).unwrap();
        assert_eq!(report.replaced.decorator_line, Some(4));

        let updated = fs::read_to_string(&path).unwrap();
        assert_eq!(
            updated,
            "import functools\n\n\ndef _twice(n):\n    return n + n\n\n\n@functools.lru_cache()\ndef double(n):\n    return _twice(n)\n"
        );
        let spans = fragment::list_functions(&updated).unwrap();
        assert_eq!(spans[0].decorator_line, None);
        assert_eq!(spans[1].name, "double");
        assert_eq!(spans[1].decorator_line, Some(8));
    }

    #[test]
    fn decorated_function_dropped_by_oracle_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cached.py");
        fs::write(&path, DECORATED).unwrap();
        let oracle = ScriptedOracle::new(["def _twice(n):\n    return n + n"]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(refactorer.refactor_function(&path, "double"))
            .unwrap_err();
        assert!(matches!(err, RefactorError::LostFunction { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), DECORATED);
    }

    #[test]
    fn line_targets_resolve_to_enclosing_function() {
        let dir = tempdir().unwrap();
        let path = write(dir.path());
        let oracle = ScriptedOracle::new(["def area(r):\n    return math.pi * r ** 2"]);
        let refactorer = Refactorer::new(&oracle, settings(Duration::from_secs(5)));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(refactorer.refactor_at_line(&path, 5)).unwrap();
        assert_eq!(report.name, "area");

        let err = rt.block_on(refactorer.refactor_at_line(&path, 2)).unwrap_err();
        assert!(matches!(
            err,
            RefactorError::Fragment(FragmentError::NotFound(Target::Line(2)))
        ));
    }
}
