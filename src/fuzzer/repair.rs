// src/fuzzer/repair.rs

use tracing::{info, warn};

use crate::catalog::Language;
use crate::fuzzer::candidate::{CodeError, ErrorKind, HarnessCandidate, Severity};
use crate::fuzzer::validator::HarnessValidator;
use crate::llm::HarnessRepairer;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Buckets a toolchain diagnostic. First matching rule wins.
pub fn classify(diagnostic: &str) -> CodeError {
    let d = diagnostic.to_lowercase();

    let (kind, severity, suggestion) =
        if d.contains("undefined reference") || d.contains("undeclared") {
            (
                ErrorKind::UndefinedSymbol,
                Severity::Error,
                "declare the symbol or include the header that provides it",
            )
        } else if d.contains("type") && (d.contains("mismatch") || d.contains("incompatible")) {
            (
                ErrorKind::TypeMismatch,
                Severity::Error,
                "cast or convert the argument to the parameter type",
            )
        } else if d.contains("syntax error") || d.contains("expected") {
            (
                ErrorKind::Syntax,
                Severity::Error,
                "check for missing semicolons, braces or parentheses",
            )
        } else if d.contains("segmentation fault") || d.contains("null pointer") {
            (
                ErrorKind::Memory,
                Severity::Critical,
                "check pointer validity and buffer bounds before use",
            )
        } else {
            (
                ErrorKind::Runtime,
                Severity::Error,
                "inspect the diagnostic output",
            )
        };

    CodeError {
        kind,
        severity,
        message: diagnostic.to_string(),
        suggestion: Some(suggestion.to_string()),
    }
}

pub struct RepairLoop {
    max_attempts: usize,
}

impl Default for RepairLoop {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RepairLoop {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Validates and repairs until the harness builds or attempts run out.
    ///
    /// Runs at most `max_attempts` validations. The returned candidate keeps
    /// every classified failure in `errors`, whether it compiled or not.
    pub fn repair_until_valid(
        &self,
        mut candidate: HarnessCandidate,
        validator: &dyn HarnessValidator,
        repairer: &dyn HarnessRepairer,
        language: Language,
    ) -> HarnessCandidate {
        for attempt in 1..=self.max_attempts {
            let result = validator.validate(&candidate.code, language);
            if result.ok {
                candidate.compiled = true;
                return candidate;
            }

            let error = classify(&result.diagnostic);
            info!(
                combination = %candidate.combination,
                attempt,
                kind = %error.kind,
                "harness failed validation"
            );
            candidate.record_error(error);

            if attempt == self.max_attempts {
                break;
            }

            match repairer.repair(&candidate.code, &result.diagnostic, language) {
                Ok(code) if !code.trim().is_empty() => candidate.replace_code(code),
                Ok(_) => {
                    candidate.record_error(service_error("repair service returned no code"));
                    return candidate;
                }
                Err(e) => {
                    warn!(combination = %candidate.combination, error = %e, "repair service failed");
                    candidate.record_error(service_error(&e.to_string()));
                    return candidate;
                }
            }
        }

        candidate.compiled = false;
        candidate
    }
}

fn service_error(message: &str) -> CodeError {
    CodeError {
        kind: ErrorKind::Runtime,
        severity: Severity::Error,
        message: message.to_string(),
        suggestion: None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::fuzzer::combination::Combination;
    use crate::fuzzer::validator::Validation;
    use crate::llm::ServiceError;

    /// Fails every build until it has seen `pass_after` validations.
    struct CountingValidator {
        calls: Cell<usize>,
        pass_after: usize,
    }

    impl CountingValidator {
        fn new(pass_after: usize) -> Self {
            Self {
                calls: Cell::new(0),
                pass_after,
            }
        }
    }

    impl HarnessValidator for CountingValidator {
        fn check_syntax(&self, _code: &str, _language: Language) -> Validation {
            Validation::pass("")
        }

        fn compile(&self, _code: &str, _language: Language) -> Validation {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n > self.pass_after {
                Validation::pass("")
            } else {
                Validation::fail("harness.c:4:1: error: expected ';'")
            }
        }

        fn quick_run(&self, _code: &str, _language: Language) -> Validation {
            Validation::pass("")
        }
    }

    struct ScriptedRepairer {
        replies: RefCell<Vec<Result<String, ServiceError>>>,
        calls: Cell<usize>,
    }

    impl ScriptedRepairer {
        fn always(code: &str) -> Self {
            Self {
                replies: RefCell::new((0..10).map(|_| Ok(code.to_string())).collect()),
                calls: Cell::new(0),
            }
        }
    }

    impl HarnessRepairer for ScriptedRepairer {
        fn repair(&self, _code: &str, _diag: &str, _lang: Language) -> Result<String, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            self.replies.borrow_mut().remove(0)
        }
    }

    fn candidate() -> HarnessCandidate {
        HarnessCandidate::new("int x", Combination::new(["parse"]))
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let validator = CountingValidator::new(usize::MAX);
        let repairer = ScriptedRepairer::always("int y");

        let out = RepairLoop::new(3).repair_until_valid(candidate(), &validator, &repairer, Language::C);

        assert!(!out.compiled);
        assert_eq!(validator.calls.get(), 3);
        assert_eq!(repairer.calls.get(), 2);
        assert_eq!(out.errors.len(), 3);
        assert!(out.errors.iter().all(|e| e.kind == ErrorKind::Syntax));
        assert_eq!(out.code, "int y");
    }

    #[test]
    fn stops_on_first_success() {
        let validator = CountingValidator::new(1);
        let repairer = ScriptedRepairer::always("int fixed;");

        let out = RepairLoop::default().repair_until_valid(candidate(), &validator, &repairer, Language::C);

        assert!(out.compiled);
        assert_eq!(validator.calls.get(), 2);
        assert_eq!(out.code, "int fixed;");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.combination, Combination::new(["parse"]));
    }

    #[test]
    fn repair_service_error_ends_early() {
        let validator = CountingValidator::new(usize::MAX);
        let repairer = ScriptedRepairer {
            replies: RefCell::new(vec![Err(ServiceError::Quota("balance is zero".into()))]),
            calls: Cell::new(0),
        };

        let out = RepairLoop::new(5).repair_until_valid(candidate(), &validator, &repairer, Language::C);

        assert!(!out.compiled);
        assert_eq!(validator.calls.get(), 1);
        assert_eq!(out.errors.len(), 2);
        let last = out.last_error().unwrap();
        assert_eq!(last.kind, ErrorKind::Runtime);
        assert!(last.message.contains("balance is zero"));
    }

    #[test]
    fn classification_is_deterministic() {
        let cases = [
            ("undefined reference to `foo'", ErrorKind::UndefinedSymbol, Severity::Error),
            ("use of undeclared identifier 'x'", ErrorKind::UndefinedSymbol, Severity::Error),
            ("incompatible pointer type passing 'int'", ErrorKind::TypeMismatch, Severity::Error),
            ("Type MISMATCH in argument", ErrorKind::TypeMismatch, Severity::Error),
            ("expected ';' after expression", ErrorKind::Syntax, Severity::Error),
            ("syntax error near token", ErrorKind::Syntax, Severity::Error),
            ("Segmentation fault (core dumped)", ErrorKind::Memory, Severity::Critical),
            ("null pointer dereference", ErrorKind::Memory, Severity::Critical),
            ("something odd happened", ErrorKind::Runtime, Severity::Error),
        ];

        for (diag, kind, severity) in cases {
            let a = classify(diag);
            let b = classify(diag);
            assert_eq!(a, b);
            assert_eq!((a.kind, a.severity), (kind, severity), "{diag}");
            assert!(a.suggestion.is_some());
        }
    }

    #[test]
    fn undefined_symbol_wins_over_syntax() {
        let e = classify("error: expected expression; undeclared identifier 'buf'");
        assert_eq!(e.kind, ErrorKind::UndefinedSymbol);
    }
}
