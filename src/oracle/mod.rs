//! Text-generation oracle
//!
//! The oracle is any `(prompt, temperature) -> text` service. Drivers never
//! talk to it directly; they go through `CandidateGenerator`, which turns
//! every failure into an empty answer.

pub mod client;

use futures::future::BoxFuture;
use tracing::{debug, error, warn};

pub use client::OpenRouterOracle;

pub trait Oracle: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Single-shot generation with no internal retry.
#[derive(Clone, Copy)]
pub struct CandidateGenerator<'a> {
    oracle: &'a dyn Oracle,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self { oracle }
    }

    /// Oracle text, or an empty string when the call failed or produced
    /// nothing.
    pub async fn generate(&self, prompt: &str, temperature: f32) -> String {
        match self.oracle.complete(prompt, temperature).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(temperature, "oracle returned no candidate");
                String::new()
            }
            Ok(text) => {
                debug!(temperature, chars = text.len(), "oracle returned candidate");
                text
            }
            Err(err) => {
                error!(temperature, error = %err, "oracle call failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedOracle;

    #[test]
    fn failures_become_empty_text() {
        let oracle = ScriptedOracle::failing("quota exceeded");
        let generator = CandidateGenerator::new(&oracle);
        let rt = tokio::runtime::Runtime::new().unwrap();
        let text = rt.block_on(generator.generate("prompt", 0.2));
        assert_eq!(text, "");
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn passes_text_and_temperature_through() {
        let oracle = ScriptedOracle::new(["x = 1"]);
        let generator = CandidateGenerator::new(&oracle);
        let rt = tokio::runtime::Runtime::new().unwrap();
        let text = rt.block_on(generator.generate("prompt", 0.4));
        assert_eq!(text, "x = 1");
        assert_eq!(oracle.temperatures(), vec![0.4]);
    }
}
