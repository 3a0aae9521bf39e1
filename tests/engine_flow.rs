use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

use harnessgen::catalog::{Catalog, FunctionSignature, Language, Param};
use harnessgen::config::Config;
use harnessgen::fuzzer::{
    CombinationPlanner, Engine, EngineError, HarnessStatus, HarnessStore, HarnessValidator,
    Termination, Validation,
};
use harnessgen::llm::prompt::SuggestionContext;
use harnessgen::llm::{
    CombinationSuggester, GenerationRequest, HarnessGenerator, HarnessRepairer, ServiceError,
};

/* ============================================================
   Fakes
   ============================================================ */

/// Writes a harness naming its targets. Targets listed in `broken` get code
/// the fake toolchain rejects, and repairs never fix it.
#[derive(Default)]
struct ScriptedAssistant {
    broken: Vec<&'static str>,
    offline: bool,
    suggestion: Option<&'static str>,
    generated: Cell<usize>,
    repairs: Cell<usize>,
    suggestions: Cell<usize>,
    requests: RefCell<Vec<Vec<String>>>,
}

impl HarnessGenerator for ScriptedAssistant {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ServiceError> {
        if self.offline {
            return Err(ServiceError::Transport("connection refused".into()));
        }
        self.generated.set(self.generated.get() + 1);
        self.requests
            .borrow_mut()
            .push(request.targets.iter().map(|t| t.name.clone()).collect());

        let mut code = String::from("#include <stdint.h>\n#include <stddef.h>\n\n");
        code.push_str("int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) {\n");
        for target in &request.targets {
            if self.broken.contains(&target.name.as_str()) {
                code.push_str("  BROKEN\n");
            }
            code.push_str(&format!("  {}(data, size);\n", target.name));
        }
        code.push_str("  return 0;\n}\n");
        Ok(code)
    }
}

impl HarnessRepairer for ScriptedAssistant {
    fn repair(&self, code: &str, _diag: &str, _lang: Language) -> Result<String, ServiceError> {
        self.repairs.set(self.repairs.get() + 1);
        Ok(code.to_string())
    }
}

impl CombinationSuggester for ScriptedAssistant {
    fn suggest(&self, _ctx: &SuggestionContext<'_>) -> Result<String, ServiceError> {
        self.suggestions.set(self.suggestions.get() + 1);
        self.suggestion
            .map(str::to_string)
            .ok_or(ServiceError::RateLimited)
    }
}

/// Rejects sources containing BROKEN. Each run reports the next coverage
/// figure from `coverage`, repeating the last one when the script runs out.
/// `totals` scripts the counter count the same way and defaults to 100.
struct ScriptedToolchain {
    coverage: Vec<u64>,
    totals: Vec<u64>,
    runs: Cell<usize>,
    compiled: RefCell<Vec<String>>,
}

impl ScriptedToolchain {
    fn new(coverage: &[u64]) -> Self {
        Self::with_totals(coverage, &[])
    }

    fn with_totals(coverage: &[u64], totals: &[u64]) -> Self {
        Self {
            coverage: coverage.to_vec(),
            totals: totals.to_vec(),
            runs: Cell::new(0),
            compiled: RefCell::new(Vec::new()),
        }
    }
}

fn scripted(values: &[u64], n: usize, default: u64) -> u64 {
    values.get(n).or(values.last()).copied().unwrap_or(default)
}

impl HarnessValidator for ScriptedToolchain {
    fn check_syntax(&self, code: &str, _language: Language) -> Validation {
        if code.contains("BROKEN") {
            Validation::fail("harness.c:6:3: error: expected ';' after expression")
        } else {
            Validation::pass("")
        }
    }

    fn compile(&self, code: &str, _language: Language) -> Validation {
        self.compiled.borrow_mut().push(code.to_string());
        Validation::pass("")
    }

    fn quick_run(&self, _code: &str, _language: Language) -> Validation {
        let n = self.runs.get();
        self.runs.set(n + 1);
        let cov = scripted(&self.coverage, n, 0);
        let total = scripted(&self.totals, n, 100);
        Validation::pass(format!(
            "INFO: Loaded 1 modules   ({total} inline 8-bit counters): {total} [0x1, 0x2),\n\
             #2\tINITED cov: {cov} ft: {cov} corp: 1/1b exec/s: 0 rss: 30Mb\n"
        ))
    }
}

/* ============================================================
   Helpers
   ============================================================ */

fn function(name: &str) -> FunctionSignature {
    FunctionSignature {
        name: name.into(),
        return_type: "int".into(),
        params: vec![
            Param {
                name: "data".into(),
                ty: "const uint8_t *".into(),
                is_pointer: true,
            },
            Param {
                name: "size".into(),
                ty: "size_t".into(),
                is_pointer: false,
            },
        ],
        file_path: "src/lib.c".into(),
        line: 10,
        is_public: true,
        docstring: None,
    }
}

fn catalog(names: &[&str]) -> Catalog {
    let mut c = Catalog::new("demo", Language::C);
    c.functions = names.iter().map(|n| function(n)).collect();
    c.includes = vec!["demo.h".into()];
    c
}

fn config(out: &Path) -> Config {
    let mut config = Config::default();
    config.output.output_dir = out.to_path_buf();
    config
}

fn engine(
    out: &Path,
    assistant: ScriptedAssistant,
    toolchain: ScriptedToolchain,
) -> Engine<ScriptedAssistant, ScriptedToolchain> {
    Engine::new(config(out), assistant, toolchain)
        .unwrap()
        .with_planner(CombinationPlanner::with_rng(StdRng::seed_from_u64(42)))
}

fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

/* ============================================================
   Tests
   ============================================================ */

#[test]
fn stops_when_threshold_is_met() {
    let out = tempfile::tempdir().unwrap();
    let mut engine = engine(
        out.path(),
        ScriptedAssistant::default(),
        ScriptedToolchain::new(&[20, 35, 50, 65, 70, 85]),
    );

    let result = engine
        .run(&catalog(&["parse", "init", "reset", "free_all", "dump"]), Some(50))
        .unwrap();

    assert_eq!(result.termination, Termination::ThresholdMet);
    assert!(result.line_coverage >= 80.0);
    assert_eq!(result.failures, 0);
    assert_eq!(result.successes, result.tested);
    assert!(result.successful.iter().all(|c| c.compiled && c.ran));

    let saved = files_in(&out.path().join("harness"));
    assert_eq!(saved.len(), result.successes);
    for path in &saved {
        let stored = HarnessStore::load(path).unwrap();
        assert_eq!(stored.status, HarnessStatus::Success);
        assert!(stored.code.contains("LLVMFuzzerTestOneInput"));
    }

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["termination"], "threshold_met");
    assert_eq!(summary["project"], "demo");
}

#[test]
fn broken_harnesses_are_bounded_and_kept() {
    let out = tempfile::tempdir().unwrap();
    let assistant = ScriptedAssistant {
        broken: vec!["reset"],
        ..ScriptedAssistant::default()
    };
    let mut engine = engine(out.path(), assistant, ScriptedToolchain::new(&[10]));

    let result = engine.run(&catalog(&["parse", "reset", "init"]), Some(20)).unwrap();

    assert_eq!(result.termination, Termination::SearchExhausted);
    // 3 singletons, 3 pairs, 1 triple
    assert_eq!(result.tested, 7);
    assert_eq!(result.failures, 4);
    assert_eq!(result.successes, 3);
    // Three validations and two repair requests per failed combination.
    assert_eq!(engine.assistant().repairs.get(), 8);
    assert!(result
        .successful
        .iter()
        .all(|c| !c.combination.names().iter().any(|n| n == "reset")));

    let failed = files_in(&out.path().join("exception"));
    assert_eq!(failed.len(), result.failures);
    for path in &failed {
        let stored = HarnessStore::load(path).unwrap();
        assert_eq!(stored.status, HarnessStatus::Failed);
        assert!(stored.targets.iter().any(|t| t == "reset"));
    }

    // Broken sources never get past the syntax gate.
    assert!(engine
        .validator()
        .compiled
        .borrow()
        .iter()
        .all(|code| !code.contains("BROKEN")));
}

#[test]
fn generation_outage_tests_nothing() {
    let out = tempfile::tempdir().unwrap();
    let assistant = ScriptedAssistant {
        offline: true,
        ..ScriptedAssistant::default()
    };
    let mut engine = engine(out.path(), assistant, ScriptedToolchain::new(&[]));

    let result = engine.run(&catalog(&["parse", "init"]), Some(3)).unwrap();

    assert_eq!(result.termination, Termination::IterationCap);
    assert_eq!(result.iterations, 3);
    assert_eq!(result.tested, 0);
    assert_eq!(result.successes, 0);
    assert_eq!(result.line_coverage, 0.0);
    assert!(files_in(&out.path().join("harness")).is_empty());
    assert!(out.path().join("summary.json").is_file());
}

#[test]
fn coverage_never_goes_down() {
    let out = tempfile::tempdir().unwrap();
    let mut engine = engine(
        out.path(),
        ScriptedAssistant::default(),
        ScriptedToolchain::new(&[60, 10, 30, 5]),
    );

    let result = engine.run(&catalog(&["a", "b", "c", "d"]), Some(1)).unwrap();

    assert_eq!(result.termination, Termination::IterationCap);
    assert_eq!(result.line_coverage, 60.0);
    assert_eq!(result.coverage.covered_lines, 60);
}

#[test]
fn larger_binaries_do_not_lower_coverage() {
    let out = tempfile::tempdir().unwrap();
    let mut engine = engine(
        out.path(),
        ScriptedAssistant::default(),
        ScriptedToolchain::with_totals(&[50, 10], &[100, 1000]),
    );

    let result = engine.run(&catalog(&["a", "b", "c", "d"]), Some(1)).unwrap();

    assert!(engine.validator().runs.get() >= 2);
    assert_eq!(result.line_coverage, 50.0);
    assert_eq!(result.coverage.total_lines, 100);
    assert_eq!(result.coverage.covered_lines, 50);
}

#[test]
fn stalled_coverage_asks_for_suggestions() {
    let out = tempfile::tempdir().unwrap();
    let assistant = ScriptedAssistant {
        suggestion: Some("- zeta, alpha\nnot_a_function"),
        ..ScriptedAssistant::default()
    };
    let names = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
    let mut engine = engine(out.path(), assistant, ScriptedToolchain::new(&[10]));

    let result = engine.run(&catalog(&names), Some(6)).unwrap();

    assert_eq!(result.iterations, 6);
    assert!(engine.assistant().suggestions.get() >= 1);
    assert_eq!(engine.validator().runs.get(), result.successes);

    // The suggested pair was built and run; the unknown name never reached
    // the generator.
    assert!(result.successful.iter().any(|c| {
        let mut targets = c.combination.names().to_vec();
        targets.sort();
        targets == ["alpha", "zeta"]
    }));
    let requests = engine.assistant().requests.borrow();
    assert_eq!(requests.len(), engine.assistant().generated.get());
    assert!(requests.iter().flatten().all(|n| names.contains(&n.as_str())));
    assert!(!requests.iter().flatten().any(|n| n == "not_a_function"));
}

#[test]
fn unusable_catalog_is_an_error() {
    let out = tempfile::tempdir().unwrap();
    let mut engine = engine(
        out.path(),
        ScriptedAssistant::default(),
        ScriptedToolchain::new(&[]),
    );

    let mut hidden = catalog(&["internal"]);
    hidden.functions[0].is_public = false;

    let err = engine.run(&hidden, None).unwrap_err();
    assert!(matches!(err, EngineError::NoPublicFunctions));
    assert!(err.to_string().contains("no combinations could ever be generated"));
}
