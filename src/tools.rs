//! External tool invocation
//!
//! The static analyzer, the formatter and the import sorter are all plain
//! child processes that take a file path as their last argument. This module
//! owns how they are described (`ToolSpec`), spawned and judged.

use crate::util::clip;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const STDERR_MAX_CHARS: usize = 600;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
    #[error("`{program}` failed (exit code {code:?}): {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn default_timeout_secs() -> u64 {
    120
}

/// How to run one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    /// Arguments placed before the target path.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `spec` with `path` appended. A non-zero exit is not an error here;
/// callers decide what counts as failure for their tool. A tool still running
/// after `timeout_secs` is killed and reported as `TimedOut`.
pub fn run_on_file(spec: &ToolSpec, path: &Path) -> Result<ToolOutput, ToolError> {
    let spawn_error = |source| ToolError::Spawn {
        program: spec.program.clone(),
        source,
    };
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = wait_with_deadline(&mut child, start + Duration::from_secs(spec.timeout_secs))?;
    let stdout = collect(stdout);
    let stderr = collect(stderr);

    let Some(status) = status else {
        warn!(tool = %spec.label(), path = %path.display(), "tool killed after timeout");
        return Err(ToolError::TimedOut {
            program: spec.program.clone(),
            secs: spec.timeout_secs,
        });
    };

    let code = status.code();
    debug!(
        tool = %spec.label(),
        path = %path.display(),
        code = ?code,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "tool finished"
    );

    Ok(ToolOutput {
        stdout,
        stderr,
        code,
    })
}

/// Read a child pipe to its end on a helper thread so a chatty tool never
/// blocks on a full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Poll `child` until it exits or `deadline` passes. `None` means the child
/// was killed (and reaped) at the deadline.
fn wait_with_deadline(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // the child may exit between the poll and the kill
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Turn a non-zero exit into `ToolError::Failed`.
pub fn require_success(spec: &ToolSpec, output: ToolOutput) -> Result<ToolOutput, ToolError> {
    if output.success() {
        return Ok(output);
    }
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    Err(ToolError::Failed {
        program: spec.program.clone(),
        code: output.code,
        stderr: clip(detail, STDERR_MAX_CHARS),
    })
}
