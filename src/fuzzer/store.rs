// src/fuzzer/store.rs
//
// On-disk layout for finished candidates:
//   <output>/harness/    validated harnesses
//   <output>/exception/  harnesses that never compiled
//   <output>/summary.json
//
// Files are never deleted or overwritten; a name clash gets a numeric suffix.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::Language;
use crate::config::OutputConfig;
use crate::fuzzer::candidate::HarnessCandidate;

const TARGETS_PREFIX: &str = "// Target functions: ";
const STATUS_PREFIX: &str = "// Status: ";
const GENERATED_PREFIX: &str = "// Generated: ";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed harness file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to encode run summary: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessStatus {
    Success,
    Failed,
}

impl fmt::Display for HarnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HarnessStatus::Success => "success",
            HarnessStatus::Failed => "failed",
        })
    }
}

impl FromStr for HarnessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "success" => Ok(HarnessStatus::Success),
            "failed" => Ok(HarnessStatus::Failed),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

/// A harness file read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHarness {
    pub targets: Vec<String>,
    pub status: HarnessStatus,
    pub generated: String,
    pub code: String,
}

pub struct HarnessStore {
    output_dir: PathBuf,
    success_dir: PathBuf,
    failure_dir: PathBuf,
}

impl HarnessStore {
    pub fn new(output: &OutputConfig) -> Result<Self, StoreError> {
        let store = Self {
            output_dir: output.output_dir.clone(),
            success_dir: output.harness_dir(),
            failure_dir: output.exception_dir(),
        };
        for dir in [&store.success_dir, &store.failure_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(store)
    }

    pub fn success_dir(&self) -> &Path {
        &self.success_dir
    }

    pub fn failure_dir(&self) -> &Path {
        &self.failure_dir
    }

    pub fn save(
        &self,
        candidate: &HarnessCandidate,
        status: HarnessStatus,
        language: Language,
    ) -> Result<PathBuf, StoreError> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.save_at(candidate, status, language, &timestamp)
    }

    pub fn save_at(
        &self,
        candidate: &HarnessCandidate,
        status: HarnessStatus,
        language: Language,
        timestamp: &str,
    ) -> Result<PathBuf, StoreError> {
        let dir = match status {
            HarnessStatus::Success => &self.success_dir,
            HarnessStatus::Failed => &self.failure_dir,
        };

        let stem = file_stem(candidate.targets(), timestamp);
        let mut content = String::new();
        content.push_str(&format!("{}{}\n", TARGETS_PREFIX, candidate.targets().join(", ")));
        content.push_str(&format!("{}{}\n", STATUS_PREFIX, status));
        content.push_str(&format!("{}{}\n\n", GENERATED_PREFIX, timestamp));
        content.push_str(&candidate.code);

        write_new(dir, &stem, language.extension(), &content)
    }

    pub fn load(path: &Path) -> Result<StoredHarness, StoreError> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_stored(&raw).map_err(|reason| StoreError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf, StoreError> {
        let path = self.output_dir.join("summary.json");
        let text = serde_json::to_string_pretty(summary)?;
        fs::write(&path, text).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/* ============================================================
   Helpers
   ============================================================ */

fn file_stem(targets: &[String], timestamp: &str) -> String {
    let names: Vec<String> = targets.iter().take(2).map(|t| sanitize(t)).collect();
    if names.is_empty() {
        format!("harness_{timestamp}")
    } else {
        format!("harness_{}_{timestamp}", names.join("_"))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn write_new(dir: &Path, stem: &str, ext: &str, content: &str) -> Result<PathBuf, StoreError> {
    let mut n = 0usize;
    loop {
        let name = if n == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{n}.{ext}")
        };
        let path = dir.join(name);

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content.as_bytes())
                    .map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(source) => return Err(StoreError::Io { path, source }),
        }
    }
}

fn parse_stored(raw: &str) -> Result<StoredHarness, String> {
    let mut rest = raw;
    let mut header = |prefix: &str| -> Result<String, String> {
        let (line, tail) = rest.split_once('\n').ok_or("truncated header")?;
        let value = line
            .strip_prefix(prefix)
            .ok_or_else(|| format!("expected `{}`", prefix.trim()))?;
        rest = tail;
        Ok(value.to_string())
    };

    let targets = header(TARGETS_PREFIX)?;
    let status = header(STATUS_PREFIX)?;
    let generated = header(GENERATED_PREFIX)?;

    let code = rest
        .strip_prefix('\n')
        .ok_or("missing blank line after header")?;

    Ok(StoredHarness {
        targets: targets
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        status: status.parse()?,
        generated,
        code: code.to_string(),
    })
}
