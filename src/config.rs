//! Configuration for lintloop
//!
//! Stored as TOML in `~/.config/lintloop/config.toml` unless `--config` points
//! elsewhere. Every field has a default, so a partial file is fine.

use crate::analysis::{ProcessAnalyzer, DEFAULT_CRASH_EXIT_MASK};
use crate::format::{FormatChain, ToolFormatter};
use crate::improve::{ImproveSettings, DEFAULT_TEMPERATURES};
use crate::oracle::client::OPENROUTER_URL;
use crate::oracle::OpenRouterOracle;
use crate::refactor::RefactorSettings;
use crate::tools::ToolSpec;
use crate::util::write_atomic;
use anyhow::Context;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const KEYRING_SERVICE: &str = "lintloop";
const KEYRING_USERNAME: &str = "openrouter_api_key";
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub formatter: FormatterConfig,
    pub import_sorter: ImportSorterConfig,
    pub improve: ImproveConfig,
    pub refactor: RefactorConfig,
    pub oracle: OracleConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Exit-code bits that mean the analyzer itself broke (pylint: fatal | usage).
    pub crash_exit_mask: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: "pylint".to_string(),
            args: Vec::new(),
            timeout_secs: 120,
            crash_exit_mask: DEFAULT_CRASH_EXIT_MASK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "black".to_string(),
            args: vec!["-q".to_string()],
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSorterConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ImportSorterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "isort".to_string(),
            args: vec!["-q".to_string()],
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImproveConfig {
    pub max_iterations: u32,
    pub temperatures: Vec<f32>,
    pub output_dir: Option<PathBuf>,
    pub scratch_dir: PathBuf,
}

impl Default for ImproveConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            temperatures: DEFAULT_TEMPERATURES.to_vec(),
            output_dir: None,
            scratch_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorConfig {
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    pub max_tokens: u32,
    pub endpoint: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "google/gemini-flash-1.5".to_string(),
            max_tokens: 8192,
            endpoint: OPENROUTER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON object mapping diagnostic codes to descriptions.
    pub path: Option<PathBuf>,
}

fn tool_spec(program: &str, args: &[String], timeout_secs: u64) -> ToolSpec {
    ToolSpec {
        program: program.to_string(),
        args: args.to_vec(),
        timeout_secs,
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lintloop").join("config.toml"))
    }

    /// Load from `path` (or the default location). Missing files give
    /// defaults; an unparsable file is moved aside and defaults are used.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "could not read config, using defaults");
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                }
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(&path, &content);
                warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, &content)
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// OpenRouter key from the environment, then the system keychain.
    pub fn get_api_key() -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Some(key);
            }
        }
        let entry = match Entry::new(KEYRING_SERVICE, KEYRING_USERNAME) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to open system keychain");
                return None;
            }
        };
        match entry.get_password() {
            Ok(key) => Some(key),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                warn!(
                    error = %err,
                    "failed to read API key from system keychain; set {API_KEY_ENV} instead"
                );
                None
            }
        }
    }

    pub fn analyzer(&self) -> ProcessAnalyzer {
        let a = &self.analyzer;
        ProcessAnalyzer::new(tool_spec(&a.program, &a.args, a.timeout_secs))
            .with_crash_exit_mask(a.crash_exit_mask)
    }

    /// Import sorter (when enabled) followed by the formatter (when enabled).
    pub fn format_chain(&self) -> FormatChain {
        let mut chain = FormatChain::new();
        let s = &self.import_sorter;
        if s.enabled {
            chain = chain.then(ToolFormatter::new(tool_spec(&s.program, &s.args, s.timeout_secs)));
        }
        let f = &self.formatter;
        if f.enabled {
            chain = chain.then(ToolFormatter::new(tool_spec(&f.program, &f.args, f.timeout_secs)));
        }
        chain
    }

    pub fn oracle(&self, api_key: String) -> OpenRouterOracle {
        OpenRouterOracle::new(api_key, self.oracle.model.clone())
            .with_endpoint(self.oracle.endpoint.clone())
            .with_max_tokens(self.oracle.max_tokens)
    }

    pub fn improve_settings(&self) -> ImproveSettings {
        ImproveSettings {
            max_iterations: self.improve.max_iterations,
            temperatures: self.improve.temperatures.clone(),
            output_dir: self.improve.output_dir.clone(),
            scratch_dir: self.improve.scratch_dir.clone(),
        }
    }

    pub fn refactor_settings(&self) -> RefactorSettings {
        RefactorSettings {
            timeout: Duration::from_secs(self.refactor.timeout_secs),
            temperature: self.refactor.temperature,
        }
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
