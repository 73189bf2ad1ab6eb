//! In-process stand-ins for the oracle, analyzer and formatter, used by the
//! unit tests so no network or external tool is needed.

use crate::analysis::StaticAnalyzer;
use crate::format::Formatter;
use crate::oracle::Oracle;
use crate::tools::ToolError;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers prompts from a fixed queue. Once the queue is drained every call
/// returns an empty string.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<String>>,
    failure: Option<String>,
    delay: Option<Duration>,
    temperatures: Mutex<Vec<f32>>,
}

impl ScriptedOracle {
    pub fn new<'s, I: IntoIterator<Item = &'s str>>(responses: I) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            failure: None,
            delay: None,
            temperatures: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(std::iter::empty())
        }
    }

    /// Sleep before answering, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.temperatures.lock().unwrap().len()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures.lock().unwrap().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        temperature: f32,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            self.temperatures.lock().unwrap().push(temperature);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = &self.failure {
                return Err(anyhow::anyhow!("{message}"));
            }
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        })
    }
}

type AnalyzeFn = dyn Fn(&Path) -> Result<String, ToolError> + Send + Sync;

/// Analyzer driven by a closure; counts invocations.
pub struct StubAnalyzer {
    respond: Box<AnalyzeFn>,
    calls: AtomicUsize,
}

impl StubAnalyzer {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&Path) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    /// Same report for every file.
    pub fn fixed(report: &str) -> Self {
        let report = report.to_string();
        Self::new(move |_| Ok(report.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StaticAnalyzer for StubAnalyzer {
    fn analyze(&self, path: &Path) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(path)
    }
}

/// Uppercases the file so tests can see that formatting ran.
pub struct UppercaseFormatter;

impl Formatter for UppercaseFormatter {
    fn format_file(&self, path: &Path) -> Result<(), ToolError> {
        let text = fs::read_to_string(path)?;
        fs::write(path, text.to_uppercase())?;
        Ok(())
    }
}

/// Analyzer report with `count` findings and a score line.
pub fn report_with_findings(count: usize) -> String {
    let mut report = String::from("************* Module app\n");
    for i in 0..count {
        report.push_str(&format!(
            "app.py:{}:0: C0114: Missing module docstring (missing-module-docstring)\n",
            i + 1
        ));
    }
    report.push_str("\n-----------------------------------\n");
    report.push_str("Your code has been rated at 5.00/10\n");
    report
}
