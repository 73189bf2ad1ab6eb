//! Static analysis: diagnostics and quality score
//!
//! The analyzer is an external process (pylint by default) whose text report
//! carries one finding per line (`path:line:col: C0114: message (symbol)`)
//! and a trailing `rated at X/10` line.

pub mod lookup;

use crate::tools::{self, ToolError, ToolSpec};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

pub use lookup::{CatalogLookup, DiagnosticLookup, NoCatalog, DESCRIPTION_NOT_FOUND};

/// Pylint sets bit 1 for fatal messages and bit 32 for usage errors; either
/// means the report is not trustworthy.
pub const DEFAULT_CRASH_EXIT_MASK: i32 = 1 | 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub description: String,
}

/// Findings of one analyzer run, in report order. Repeated codes are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSet(Vec<Diagnostic>);

impl DiagnosticSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// One `- CODE (message): description` line per finding.
    pub fn format_for_prompt(&self) -> String {
        self.0
            .iter()
            .map(|d| format!("- {} ({}): {}", d.code, d.message, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Diagnostic>> for DiagnosticSet {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self(items)
    }
}

impl<'a> IntoIterator for &'a DiagnosticSet {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Produces the raw text report for a file.
pub trait StaticAnalyzer {
    fn analyze(&self, path: &Path) -> Result<String, ToolError>;
}

/// Runs the configured analyzer as a child process.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    spec: ToolSpec,
    crash_exit_mask: i32,
}

impl ProcessAnalyzer {
    pub fn new(spec: ToolSpec) -> Self {
        Self {
            spec,
            crash_exit_mask: DEFAULT_CRASH_EXIT_MASK,
        }
    }

    pub fn with_crash_exit_mask(mut self, mask: i32) -> Self {
        self.crash_exit_mask = mask;
        self
    }
}

impl StaticAnalyzer for ProcessAnalyzer {
    fn analyze(&self, path: &Path) -> Result<String, ToolError> {
        let output = tools::run_on_file(&self.spec, path)?;
        // Findings produce non-zero exits on their own; only crash bits matter.
        let crashed = match output.code {
            None => true,
            Some(code) => code & self.crash_exit_mask != 0,
        };
        if crashed {
            return tools::require_success(&self.spec, output).map(|o| o.stdout);
        }
        Ok(output.stdout)
    }
}

/// `(code, message)` pairs in report order.
pub fn parse_findings(report: &str) -> Vec<(String, String)> {
    let Ok(re) = Regex::new(r": ([A-Z]\d{4}): (.+?)\s*$") else {
        return Vec::new();
    };
    report
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            Some((caps[1].to_string(), caps[2].to_string()))
        })
        .collect()
}

/// Score from the trailing `rated at X/10` line, if present.
pub fn parse_score(report: &str) -> Option<f64> {
    let re = Regex::new(r"rated at (-?\d+(?:\.\d+)?)/10").ok()?;
    re.captures_iter(report)
        .last()
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Scalar quality of a report; 0.0 when the score line is missing.
pub fn quality_score(report: &str) -> f64 {
    parse_score(report).unwrap_or_else(|| {
        warn!("analyzer report has no score line, using 0.0");
        0.0
    })
}

/// Runs the analyzer and enriches each finding with its description.
pub struct DiagnosticExtractor<'a> {
    analyzer: &'a dyn StaticAnalyzer,
    lookup: &'a dyn DiagnosticLookup,
}

impl<'a> DiagnosticExtractor<'a> {
    pub fn new(analyzer: &'a dyn StaticAnalyzer, lookup: &'a dyn DiagnosticLookup) -> Self {
        Self { analyzer, lookup }
    }

    pub fn extract(&self, path: &Path) -> Result<DiagnosticSet, ToolError> {
        let report = self.analyzer.analyze(path)?;
        Ok(self.enrich(parse_findings(&report)))
    }

    /// Findings plus score from a single analyzer run.
    pub fn extract_with_score(&self, path: &Path) -> Result<(DiagnosticSet, Option<f64>), ToolError> {
        let report = self.analyzer.analyze(path)?;
        Ok((self.enrich(parse_findings(&report)), parse_score(&report)))
    }

    fn enrich(&self, findings: Vec<(String, String)>) -> DiagnosticSet {
        let mut descriptions: HashMap<String, String> = HashMap::new();
        let items = findings
            .into_iter()
            .map(|(code, message)| {
                let description = descriptions
                    .entry(code.clone())
                    .or_insert_with(|| {
                        self.lookup.describe(&code).unwrap_or_else(|| {
                            debug!(code = %code, "no description for diagnostic code");
                            DESCRIPTION_NOT_FOUND.to_string()
                        })
                    })
                    .clone();
                Diagnostic {
                    code,
                    message,
                    description,
                }
            })
            .collect::<Vec<_>>();
        DiagnosticSet(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAnalyzer;
    use std::cell::Cell;
    use std::path::PathBuf;

    const REPORT: &str = "\
************* Module app
app.py:1:0: C0114: Missing module docstring (missing-module-docstring)
app.py:3:0: W0611: Unused import os (unused-import)
app.py:9:4: W0611: Unused import sys (unused-import)

------------------------------------------------------------------
Your code has been rated at 6.67/10 (previous run: 5.00/10, +1.67)
";

    #[test]
    fn parses_findings_in_order_with_duplicates() {
        let findings = parse_findings(REPORT);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].0, "C0114");
        assert_eq!(findings[0].1, "Missing module docstring (missing-module-docstring)");
        assert_eq!(findings[1].0, "W0611");
        assert_eq!(findings[2].0, "W0611");
    }

    #[test]
    fn parses_trailing_score() {
        assert_eq!(parse_score(REPORT), Some(6.67));
        assert_eq!(parse_score("Your code has been rated at -2.50/10"), Some(-2.5));
        assert_eq!(parse_score("Your code has been rated at 10/10"), Some(10.0));
        assert_eq!(parse_score("no score here"), None);
        assert_eq!(quality_score("no score here"), 0.0);
    }

    struct CountingLookup {
        calls: Cell<usize>,
    }

    impl DiagnosticLookup for CountingLookup {
        fn describe(&self, code: &str) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            (code == "W0611").then(|| "Used when an imported module is unused.".to_string())
        }
    }

    #[test]
    fn extract_enriches_and_falls_back_on_miss() {
        let analyzer = StubAnalyzer::fixed(REPORT);
        let lookup = CountingLookup { calls: Cell::new(0) };
        let extractor = DiagnosticExtractor::new(&analyzer, &lookup);

        let set = extractor.extract(&PathBuf::from("app.py")).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().next().unwrap().description, DESCRIPTION_NOT_FOUND);
        assert_eq!(
            set.iter().nth(1).unwrap().description,
            "Used when an imported module is unused."
        );
        // one lookup per unique code
        assert_eq!(lookup.calls.get(), 2);
    }

    #[test]
    fn empty_report_is_empty_set() {
        let analyzer = StubAnalyzer::fixed("\n");
        let extractor = DiagnosticExtractor::new(&analyzer, &NoCatalog);
        assert!(extractor.extract(&PathBuf::from("x.py")).unwrap().is_empty());
    }

    #[test]
    fn prompt_format_lists_each_finding() {
        let set = DiagnosticSet::from(vec![Diagnostic {
            code: "C0114".into(),
            message: "Missing module docstring".into(),
            description: "Module has no docstring.".into(),
        }]);
        assert_eq!(
            set.format_for_prompt(),
            "- C0114 (Missing module docstring): Module has no docstring."
        );
    }

    #[test]
    fn missing_analyzer_binary_surfaces_tool_error() {
        let analyzer = ProcessAnalyzer::new(ToolSpec::new("lintloop-no-such-analyzer"));
        let extractor = DiagnosticExtractor::new(&analyzer, &NoCatalog);
        let err = extractor.extract(&PathBuf::from("x.py")).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
