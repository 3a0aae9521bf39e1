// src/fuzzer/validator.rs
//
// Toolchain gate for generated harnesses: syntax check, sanitizer build,
// and a short libFuzzer run. All scratch files live in one TempDir that
// goes away with the validator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

use crate::catalog::Language;
use crate::config::{Config, FuzzerConfig};
use crate::fuzzer::process::{run_with_timeout, ProcessOutput};

const ARTIFACT: &str = "harness.out";
const SANITIZER_FLAGS: [&str; 3] = ["-fsanitize=fuzzer,address", "-g", "-O1"];
const CRASH_MARKERS: [&str; 2] = ["ERROR", "SUMMARY"];
const BUDGET_NOTE: &str = "ran to budget without crashing";

/// Outcome of one toolchain step. `diagnostic` carries compiler errors on
/// failure and the fuzzer's own output after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub diagnostic: String,
}

impl Validation {
    pub fn pass(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: true,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostic: diagnostic.into(),
        }
    }
}

pub trait HarnessValidator {
    fn check_syntax(&self, code: &str, language: Language) -> Validation;

    fn compile(&self, code: &str, language: Language) -> Validation;

    fn quick_run(&self, code: &str, language: Language) -> Validation;

    /// Syntax gate, then a full build.
    fn validate(&self, code: &str, language: Language) -> Validation {
        let syntax = self.check_syntax(code, language);
        if !syntax.ok {
            return syntax;
        }
        self.compile(code, language)
    }
}

pub struct Validator {
    workspace: TempDir,
    fuzzer: FuzzerConfig,
}

impl Validator {
    pub fn new(config: &Config) -> io::Result<Self> {
        let workspace = tempfile::Builder::new().prefix("harnessgen-").tempdir()?;
        debug!(path = %workspace.path().display(), "validator workspace created");
        Ok(Self {
            workspace,
            fuzzer: config.fuzzer.clone(),
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Deletes the workspace now instead of on drop, surfacing any error.
    pub fn close(self) -> io::Result<()> {
        self.workspace.close()
    }

    fn artifact(&self) -> PathBuf {
        self.workspace.path().join(ARTIFACT)
    }

    fn write_source(&self, stem: &str, code: &str, language: Language) -> io::Result<PathBuf> {
        let path = self
            .workspace
            .path()
            .join(format!("{stem}.{}", language.extension()));
        fs::write(&path, code)?;
        Ok(path)
    }

    fn toolchain(
        &self,
        language: Language,
        args: &[&str],
        source: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, Validation> {
        let cc = self.fuzzer.compiler(language);
        let mut cmd = Command::new(cc);
        cmd.args(args).arg(source).current_dir(self.workspace.path());

        run_with_timeout(cmd, timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Validation::fail(format!("compiler not found: {cc}"))
            } else {
                Validation::fail(format!("failed to start {cc}: {e}"))
            }
        })
    }
}

impl HarnessValidator for Validator {
    fn check_syntax(&self, code: &str, language: Language) -> Validation {
        let source = match self.write_source("syntax_check", code, language) {
            Ok(p) => p,
            Err(e) => return Validation::fail(format!("failed to write source: {e}")),
        };

        let out = match self.toolchain(
            language,
            &["-fsyntax-only"],
            &source,
            self.fuzzer.syntax_timeout(),
        ) {
            Ok(out) => out,
            Err(v) => return v,
        };

        if out.timed_out() {
            Validation::fail("syntax check timeout")
        } else if out.success() {
            Validation::pass(String::new())
        } else {
            Validation::fail(out.stderr)
        }
    }

    fn compile(&self, code: &str, language: Language) -> Validation {
        let artifact = self.artifact();
        if artifact.exists() {
            if let Err(e) = fs::remove_file(&artifact) {
                return Validation::fail(format!("failed to remove stale artifact: {e}"));
            }
        }

        let source = match self.write_source("harness", code, language) {
            Ok(p) => p,
            Err(e) => return Validation::fail(format!("failed to write source: {e}")),
        };

        let mut args: Vec<&str> = SANITIZER_FLAGS.to_vec();
        args.extend(["-o", ARTIFACT]);
        // Flags first, then `-o harness.out`, then the source path.
        let out = match self.toolchain(language, &args, &source, self.fuzzer.compile_timeout()) {
            Ok(out) => out,
            Err(v) => return v,
        };

        if out.timed_out() {
            Validation::fail("compilation timeout")
        } else if out.success() {
            Validation::pass(out.stderr)
        } else {
            Validation::fail(out.stderr)
        }
    }

    /// Runs the last compiled artifact for the configured budget.
    ///
    /// A run that hits the wall-clock deadline without printing a sanitizer
    /// marker counts as success. That is optimistic: a hang looks the same.
    fn quick_run(&self, _code: &str, _language: Language) -> Validation {
        let artifact = self.artifact();
        if !artifact.is_file() {
            return Validation::fail("no compiled artifact");
        }

        let corpus = self.workspace.path().join("corpus");
        if let Err(e) = fs::create_dir_all(&corpus).and_then(|_| fs::write(corpus.join("seed"), b"seed"))
        {
            return Validation::fail(format!("failed to seed corpus: {e}"));
        }

        let mut cmd = Command::new(&artifact);
        cmd.arg(&corpus)
            .arg(format!("-max_total_time={}", self.fuzzer.run_budget_secs))
            .current_dir(self.workspace.path());

        let out = match run_with_timeout(cmd, self.fuzzer.run_timeout()) {
            Ok(out) => out,
            Err(e) => return Validation::fail(format!("failed to run harness: {e}")),
        };

        if CRASH_MARKERS.iter().any(|m| out.stderr.contains(m)) {
            return Validation::fail(out.stderr);
        }

        let mut report = String::new();
        if out.timed_out() {
            report.push_str(BUDGET_NOTE);
            report.push('\n');
        }
        report.push_str(&out.stderr);
        report.push_str(&out.stdout);
        Validation::pass(report)
    }
}
