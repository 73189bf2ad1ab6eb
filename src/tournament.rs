//! Multi-temperature candidate tournament
//!
//! The same prompt is sent once per temperature, in the order given. Each
//! valid candidate is written to `temp_file_<index>.<ext>`, scored by the
//! analyzer and the scratch file removed again. The first candidate reaching
//! the best score wins, so identical oracle output always yields the same
//! winner.

use crate::analysis::{quality_score, StaticAnalyzer};
use crate::candidate::{self, Candidate};
use crate::format::remove_scratch;
use crate::oracle::CandidateGenerator;
use crate::tools::ToolError;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("the oracle produced no candidate at any temperature")]
    NoCandidates,
    #[error("none of the {attempts} candidates parsed")]
    AllInvalid { attempts: usize },
    #[error("scoring failed: {0}")]
    Tool(#[from] ToolError),
}

/// The winning candidate plus every attempt, for reporting.
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub temperature: f32,
    pub text: String,
    pub score: f64,
    pub candidates: Vec<Candidate>,
}

pub struct Tournament<'a> {
    generator: CandidateGenerator<'a>,
    analyzer: &'a dyn StaticAnalyzer,
    scratch_dir: PathBuf,
    extension: String,
}

impl<'a> Tournament<'a> {
    pub fn new(
        generator: CandidateGenerator<'a>,
        analyzer: &'a dyn StaticAnalyzer,
        scratch_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            analyzer,
            scratch_dir: scratch_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn scratch_path(&self, index: usize) -> PathBuf {
        self.scratch_dir
            .join(format!("temp_file_{}.{}", index, self.extension))
    }

    /// Run one candidate per temperature, sequentially, and pick the best.
    pub async fn select(
        &self,
        prompt: &str,
        temperatures: &[f32],
    ) -> Result<Selection, TournamentError> {
        let mut candidates = Vec::with_capacity(temperatures.len());

        for (index, &temperature) in temperatures.iter().enumerate() {
            let raw = self.generator.generate(prompt, temperature).await;
            if raw.trim().is_empty() {
                candidates.push(Candidate {
                    index,
                    temperature,
                    text: raw,
                    valid: false,
                    score: None,
                });
                continue;
            }

            let validation = candidate::validate(&raw);
            if validation.cleaned.trim().is_empty() {
                // a fence with nothing inside parses as an empty module
                warn!(index, temperature, "candidate is empty after cleaning");
                candidates.push(Candidate {
                    index,
                    temperature,
                    text: validation.cleaned,
                    valid: false,
                    score: None,
                });
                continue;
            }
            if !validation.ok {
                warn!(
                    index,
                    temperature,
                    issue = ?validation.issue,
                    "candidate does not parse, skipping scoring"
                );
                candidates.push(Candidate {
                    index,
                    temperature,
                    text: validation.cleaned,
                    valid: false,
                    score: None,
                });
                continue;
            }

            let score = self.score(index, &validation.cleaned)?;
            info!(index, temperature, score, "candidate scored");
            candidates.push(Candidate {
                index,
                temperature,
                text: validation.cleaned,
                valid: true,
                score: Some(score),
            });
        }

        let Some(best) = pick_best(&candidates) else {
            if candidates.iter().all(|c| c.text.trim().is_empty()) {
                return Err(TournamentError::NoCandidates);
            }
            return Err(TournamentError::AllInvalid {
                attempts: candidates.len(),
            });
        };

        let winner = &candidates[best];
        info!(
            index = winner.index,
            temperature = winner.temperature,
            score = winner.score.unwrap_or_default(),
            "tournament winner"
        );
        Ok(Selection {
            index: winner.index,
            temperature: winner.temperature,
            text: winner.text.clone(),
            score: winner.score.unwrap_or_default(),
            candidates,
        })
    }

    fn score(&self, index: usize, text: &str) -> Result<f64, ToolError> {
        let scratch = self.scratch_path(index);
        fs::write(&scratch, text)?;
        let report = self.analyzer.analyze(&scratch);
        remove_scratch(&scratch);
        Ok(quality_score(&report?))
    }
}

/// Index of the first candidate holding the maximum score. Unscored
/// candidates never win.
pub fn pick_best(candidates: &[Candidate]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(score) = candidate.score else {
            continue;
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}
