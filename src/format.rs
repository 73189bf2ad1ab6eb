//! Source formatting through external tools (black, optionally isort first).

use crate::tools::{self, ToolError, ToolSpec};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Rewrites a file in place.
pub trait Formatter {
    fn format_file(&self, path: &Path) -> Result<(), ToolError>;
}

/// A formatter backed by one external process. Non-zero exit is a hard error.
#[derive(Debug, Clone)]
pub struct ToolFormatter {
    spec: ToolSpec,
}

impl ToolFormatter {
    pub fn new(spec: ToolSpec) -> Self {
        Self { spec }
    }
}

impl Formatter for ToolFormatter {
    fn format_file(&self, path: &Path) -> Result<(), ToolError> {
        let output = tools::run_on_file(&self.spec, path)?;
        tools::require_success(&self.spec, output).map(|_| ())
    }
}

/// Runs each step in order; an empty chain leaves the file alone.
#[derive(Default)]
pub struct FormatChain {
    steps: Vec<Box<dyn Formatter + Send + Sync>>,
}

impl FormatChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl Formatter + Send + Sync + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Formatter for FormatChain {
    fn format_file(&self, path: &Path) -> Result<(), ToolError> {
        for step in &self.steps {
            step.format_file(path)?;
        }
        Ok(())
    }
}

/// Format `text` by round-tripping it through `scratch`. The scratch file is
/// removed afterwards whether or not formatting succeeded.
pub fn format_source(
    formatter: &dyn Formatter,
    text: &str,
    scratch: &Path,
) -> Result<String, ToolError> {
    fs::write(scratch, text)?;
    let result = formatter
        .format_file(scratch)
        .and_then(|()| fs::read_to_string(scratch).map_err(ToolError::from));
    remove_scratch(scratch);
    result
}

/// Best-effort delete; failure is logged, never raised.
pub fn remove_scratch(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "scratch file could not be deleted");
        }
    }
}
