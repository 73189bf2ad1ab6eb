//! Whole-file improvement loop
//!
//! Each round analyzes the current revision, asks the tournament for a
//! rewrite, vets the winner (parse, format, parse again, re-analyze) and only
//! then persists it as the next revision. A round that does not strictly
//! reduce the diagnostic count ends the loop without writing anything.

use crate::analysis::{DiagnosticExtractor, DiagnosticLookup, StaticAnalyzer};
use crate::candidate;
use crate::format::{format_source, remove_scratch, Formatter};
use crate::oracle::{CandidateGenerator, Oracle};
use crate::prompt;
use crate::revision::{self, Revision, RevisionLog};
use crate::syntax;
use crate::tournament::{Tournament, TournamentError};
use crate::util::extension_of;
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_TEMPERATURES: [f32; 3] = [0.2, 0.4, 0.6];

#[derive(Debug, Clone)]
pub struct ImproveSettings {
    pub max_iterations: u32,
    pub temperatures: Vec<f32>,
    pub output_dir: Option<PathBuf>,
    /// Where tournament candidates are scored. The promoted winner is vetted
    /// beside the file it replaces instead.
    pub scratch_dir: PathBuf,
}

impl Default for ImproveSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            temperatures: DEFAULT_TEMPERATURES.to_vec(),
            output_dir: None,
            scratch_dir: PathBuf::from("."),
        }
    }
}

/// Why the loop stopped. Every variant is terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The analyzer reported nothing left to fix.
    Converged,
    /// The diagnostic count did not go down.
    Stalled { previous: usize, current: usize },
    /// The oracle produced no usable text.
    OracleFailure,
    /// The winning rewrite failed syntax validation.
    InvalidOutput { detail: String },
    /// The analyzer or formatter could not be run.
    ToolFailure { detail: String },
    /// `max_iterations` rounds ran without an early exit.
    BudgetExhausted,
}

impl StopReason {
    pub fn describe(&self) -> String {
        match self {
            StopReason::Converged => "converged: no diagnostics left".to_string(),
            StopReason::Stalled { previous, current } => format!(
                "stalled: {} diagnostics, previously {}",
                current, previous
            ),
            StopReason::OracleFailure => "oracle returned no usable candidate".to_string(),
            StopReason::InvalidOutput { detail } => format!("invalid output: {}", detail),
            StopReason::ToolFailure { detail } => format!("tool failure: {}", detail),
            StopReason::BudgetExhausted => "iteration budget exhausted".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImproveOutcome {
    pub stop: StopReason,
    /// Rounds started, including the one that stopped.
    pub rounds: u32,
    pub log: RevisionLog,
}

impl ImproveOutcome {
    /// Path of the newest revision, or the input when nothing was promoted.
    pub fn final_path(&self) -> &Path {
        self.log
            .latest()
            .map(|r| r.path.as_path())
            .unwrap_or(self.log.source.as_path())
    }
}

/// A formatted winner that passed every gate.
struct Vetted {
    text: String,
    diagnostic_count: usize,
    score: Option<f64>,
}

pub struct Improver<'a> {
    analyzer: &'a dyn StaticAnalyzer,
    lookup: &'a dyn DiagnosticLookup,
    formatter: &'a dyn Formatter,
    oracle: &'a dyn Oracle,
    settings: ImproveSettings,
}

impl<'a> Improver<'a> {
    pub fn new(
        analyzer: &'a dyn StaticAnalyzer,
        lookup: &'a dyn DiagnosticLookup,
        formatter: &'a dyn Formatter,
        oracle: &'a dyn Oracle,
        settings: ImproveSettings,
    ) -> Self {
        Self {
            analyzer,
            lookup,
            formatter,
            oracle,
            settings,
        }
    }

    /// Drive rounds over `path` until a terminal state. Only file-system
    /// errors on the source or revisions escape; everything else becomes a
    /// `StopReason`.
    pub async fn run(&self, path: &Path) -> anyhow::Result<ImproveOutcome> {
        let extractor = DiagnosticExtractor::new(self.analyzer, self.lookup);
        let extension = extension_of(path);
        let tournament = Tournament::new(
            CandidateGenerator::new(self.oracle),
            self.analyzer,
            &self.settings.scratch_dir,
            extension.clone(),
        );

        let mut log = RevisionLog::new(path);
        let mut current = path.to_path_buf();
        let mut previous_count: Option<usize> = None;
        let mut rounds = 0;

        let stop = 'rounds: {
            for iteration in 1..=self.settings.max_iterations {
                rounds = iteration;
                info!(
                    iteration,
                    max = self.settings.max_iterations,
                    path = %current.display(),
                    "round started"
                );

                let diagnostics = match extractor.extract(&current) {
                    Ok(d) => d,
                    Err(err) => {
                        break 'rounds StopReason::ToolFailure {
                            detail: err.to_string(),
                        }
                    }
                };
                if diagnostics.is_empty() {
                    break 'rounds StopReason::Converged;
                }
                let count = diagnostics.len();
                if let Some(previous) = previous_count.filter(|&p| count >= p) {
                    warn!(previous, current = count, "no improvement, stopping");
                    break 'rounds StopReason::Stalled {
                        previous,
                        current: count,
                    };
                }

                let source = fs::read_to_string(&current)
                    .with_context(|| format!("Failed to read {}", current.display()))?;
                let prompt = prompt::improvement_prompt(&source, &diagnostics);

                let selection = match tournament.select(&prompt, &self.settings.temperatures).await {
                    Ok(selection) => selection,
                    Err(TournamentError::NoCandidates) => {
                        error!(iteration, "no valid response from the oracle");
                        break 'rounds StopReason::OracleFailure;
                    }
                    Err(err @ TournamentError::AllInvalid { .. }) => {
                        break 'rounds StopReason::InvalidOutput {
                            detail: err.to_string(),
                        }
                    }
                    Err(TournamentError::Tool(err)) => {
                        break 'rounds StopReason::ToolFailure {
                            detail: err.to_string(),
                        }
                    }
                };
                if selection.text.trim().is_empty() {
                    break 'rounds StopReason::OracleFailure;
                }

                let vetted = match self.vet(&extractor, &selection.text, &current, &extension) {
                    Ok(vetted) => vetted,
                    Err(stop) => break 'rounds stop,
                };
                if vetted.diagnostic_count >= count {
                    warn!(
                        previous = count,
                        current = vetted.diagnostic_count,
                        "winner does not reduce diagnostics, not promoting"
                    );
                    break 'rounds StopReason::Stalled {
                        previous: count,
                        current: vetted.diagnostic_count,
                    };
                }

                let target = revision::revision_path(path, self.settings.output_dir.as_deref(), iteration);
                revision::persist(&target, &vetted.text)
                    .with_context(|| format!("Failed to write revision {}", target.display()))?;
                info!(
                    iteration,
                    path = %target.display(),
                    diagnostics = vetted.diagnostic_count,
                    "revision saved"
                );
                log.push(Revision {
                    iteration,
                    path: target.clone(),
                    diagnostic_count: vetted.diagnostic_count,
                    score: vetted.score.or(Some(selection.score)),
                    created_at: Utc::now(),
                });

                previous_count = Some(count);
                current = target;
            }
            StopReason::BudgetExhausted
        };

        info!(rounds, revisions = log.len(), stop = %stop.describe(), "improvement finished");
        if !log.is_empty() {
            let log_path = revision::log_path(path, self.settings.output_dir.as_deref());
            if let Err(err) = log.save(&log_path) {
                warn!(path = %log_path.display(), error = %err, "revision log could not be written");
            }
        }

        Ok(ImproveOutcome { stop, rounds, log })
    }

    /// Clean, parse, format, parse again and re-analyze the round winner.
    ///
    /// The vetting copy lives next to `current`, so the analyzer resolves
    /// imports exactly as it did for the round-start count it is compared to.
    fn vet(
        &self,
        extractor: &DiagnosticExtractor<'_>,
        winner: &str,
        current: &Path,
        extension: &str,
    ) -> Result<Vetted, StopReason> {
        let validation = candidate::validate(winner);
        if !validation.ok {
            error!(issue = ?validation.issue, "winning candidate contains syntax errors");
            return Err(StopReason::InvalidOutput {
                detail: validation
                    .issue
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "unparseable".to_string()),
            });
        }

        let scratch = current
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("temp_file_revision.{}", extension));
        let result = self.vet_on_disk(extractor, &validation.cleaned, &scratch);
        remove_scratch(&scratch);
        result
    }

    fn vet_on_disk(
        &self,
        extractor: &DiagnosticExtractor<'_>,
        cleaned: &str,
        scratch: &Path,
    ) -> Result<Vetted, StopReason> {
        let tool_failure = |detail: String| StopReason::ToolFailure { detail };

        let mut text = cleaned.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        let formatted = format_source(self.formatter, &text, scratch)
            .map_err(|e| tool_failure(e.to_string()))?;

        if let Err(issue) = syntax::check_python(&formatted) {
            return Err(StopReason::InvalidOutput {
                detail: issue.to_string(),
            });
        }

        // format_source cleans up after itself; analyze the formatted text in place
        fs::write(scratch, &formatted).map_err(|e| tool_failure(e.to_string()))?;
        let (diagnostics, score) = extractor
            .extract_with_score(scratch)
            .map_err(|e| tool_failure(e.to_string()))?;

        Ok(Vetted {
            text: formatted,
            diagnostic_count: diagnostics.len(),
            score,
        })
    }
}
