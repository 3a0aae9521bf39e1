// src/config.rs
//
// Run policy: timeouts, thresholds, toolchain and output locations.
// Built once and passed by value into the engine and validator.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Language;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FuzzerConfig {
    pub max_iterations: usize,
    /// Line coverage percentage that ends a run early.
    pub coverage_threshold: f64,
    pub syntax_timeout_secs: u64,
    pub compile_timeout_secs: u64,
    /// Value passed as `-max_total_time` to the harness.
    pub run_budget_secs: u64,
    /// Wall-clock deadline for the harness process itself.
    pub run_timeout_secs: u64,
    pub max_repair_attempts: usize,
    pub cc: String,
    pub cxx: String,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            coverage_threshold: 80.0,
            syntax_timeout_secs: 10,
            compile_timeout_secs: 30,
            run_budget_secs: 5,
            run_timeout_secs: 10,
            max_repair_attempts: 3,
            cc: "clang".into(),
            cxx: "clang++".into(),
        }
    }
}

impl FuzzerConfig {
    pub fn compiler(&self, language: Language) -> &str {
        match language {
            Language::C => &self.cc,
            Language::Cpp => &self.cxx,
        }
    }

    pub fn syntax_timeout(&self) -> Duration {
        Duration::from_secs(self.syntax_timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
        }
    }
}

impl OutputConfig {
    pub fn harness_dir(&self) -> PathBuf {
        self.output_dir.join("harness")
    }

    pub fn exception_dir(&self) -> PathBuf {
        self.output_dir.join("exception")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub fuzzer: FuzzerConfig,
    pub output: OutputConfig,
    /// Per-request timeout for the text services.
    pub llm_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fuzzer: FuzzerConfig::default(),
            output: OutputConfig::default(),
            llm_timeout_secs: 120,
        }
    }
}

impl Config {
    /// `<config_dir>/harnessgen/config.toml` when present, defaults otherwise,
    /// then `HARNESSGEN_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_file(&config_path())?;
        cfg.apply_env(|k| env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(v) = lookup("HARNESSGEN_OUTPUT_DIR") {
            self.output.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("HARNESSGEN_MAX_ITERATIONS") {
            self.fuzzer.max_iterations = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "HARNESSGEN_MAX_ITERATIONS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("HARNESSGEN_COVERAGE_THRESHOLD") {
            self.fuzzer.coverage_threshold =
                v.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "HARNESSGEN_COVERAGE_THRESHOLD",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup("HARNESSGEN_CC") {
            self.fuzzer.cc = v;
        }
        if let Some(v) = lookup("HARNESSGEN_CXX") {
            self.fuzzer.cxx = v;
        }
        Ok(())
    }
}

fn config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("harnessgen");
    dir.push("config.toml");
    dir
}
