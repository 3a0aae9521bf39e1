use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fuzzer::combination::Combination;
use crate::fuzzer::coverage::CoverageSample;

/// What went wrong with a candidate, as far as substring heuristics can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Logic,
    Memory,
    TypeMismatch,
    UndefinedSymbol,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Logic => "logic",
            ErrorKind::Memory => "memory",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::UndefinedSymbol => "undefined_symbol",
            ErrorKind::Runtime => "runtime",
        };
        f.write_str(s)
    }
}

/// A generated harness moving through validation and repair.
///
/// `errors` is append-only: each failed attempt adds one entry, so the repair
/// history stays auditable after the candidate is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessCandidate {
    pub code: String,
    pub combination: Combination,
    pub errors: Vec<CodeError>,
    pub compiled: bool,
    pub ran: bool,
    pub coverage: Option<CoverageSample>,
}

impl HarnessCandidate {
    pub fn new(code: impl Into<String>, combination: Combination) -> Self {
        Self {
            code: code.into(),
            combination,
            errors: Vec::new(),
            compiled: false,
            ran: false,
            coverage: None,
        }
    }

    /// Swaps in repaired source. Targets and error history are kept; the
    /// result flags reset because the new code has not been validated.
    pub fn replace_code(&mut self, code: String) {
        self.code = code;
        self.compiled = false;
        self.ran = false;
        self.coverage = None;
    }

    pub fn record_error(&mut self, error: CodeError) {
        self.errors.push(error);
    }

    pub fn targets(&self) -> &[String] {
        self.combination.names()
    }

    pub fn last_error(&self) -> Option<&CodeError> {
        self.errors.last()
    }
}
