// src/fuzzer/engine.rs
//
// The iteration loop: plan -> generate -> validate/repair -> record ->
// persist -> fold coverage -> decide whether to go on.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::fuzzer::candidate::HarnessCandidate;
use crate::fuzzer::combination::{Combination, TestedSet};
use crate::fuzzer::coverage::{parse_libfuzzer_output, CoverageSample};
use crate::fuzzer::planner::CombinationPlanner;
use crate::fuzzer::repair::RepairLoop;
use crate::fuzzer::store::{HarnessStatus, HarnessStore, StoreError};
use crate::fuzzer::validator::HarnessValidator;
use crate::llm::{CombinationSuggester, GenerationRequest, HarnessGenerator, HarnessRepairer};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("catalog has no functions")]
    EmptyCatalog,

    #[error("catalog has no public functions; no combinations could ever be generated")]
    NoPublicFunctions,

    #[error("iteration cap must be greater than zero")]
    InvalidIterations,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ThresholdMet,
    SearchExhausted,
    IterationCap,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::ThresholdMet => "coverage threshold met",
            Termination::SearchExhausted => "no untested combinations left",
            Termination::IterationCap => "iteration cap reached",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub project: String,
    pub started_at: String,
    pub finished_at: String,
    pub termination: Termination,
    pub iterations: usize,
    pub tested: usize,
    pub successes: usize,
    pub failures: usize,
    pub line_coverage: f64,
    pub branch_coverage: f64,
    pub coverage: CoverageSample,
    pub summary: String,
    pub successful: Vec<HarnessCandidate>,
}

/// Per-run state. Dropped when `run` returns.
#[derive(Default)]
struct RunState {
    tested: TestedSet,
    aggregate: CoverageSample,
    history: Vec<CoverageSample>,
    successes: Vec<HarnessCandidate>,
    failures: Vec<HarnessCandidate>,
}

pub struct Engine<A, V> {
    config: Config,
    assistant: A,
    validator: V,
    planner: CombinationPlanner,
    repair: RepairLoop,
    store: HarnessStore,
}

impl<A, V> Engine<A, V>
where
    A: HarnessGenerator + HarnessRepairer + CombinationSuggester,
    V: HarnessValidator,
{
    pub fn new(config: Config, assistant: A, validator: V) -> Result<Self, EngineError> {
        let store = HarnessStore::new(&config.output)?;
        let repair = RepairLoop::new(config.fuzzer.max_repair_attempts);
        Ok(Self {
            config,
            assistant,
            validator,
            planner: CombinationPlanner::new(),
            repair,
            store,
        })
    }

    /// Replaces the planner, e.g. with one on a seeded RNG.
    pub fn with_planner(mut self, planner: CombinationPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn into_validator(self) -> V {
        self.validator
    }

    pub fn run(
        &mut self,
        catalog: &Catalog,
        max_iterations: Option<usize>,
    ) -> Result<RunResult, EngineError> {
        if catalog.functions.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }
        if catalog.public_names().is_empty() {
            return Err(EngineError::NoPublicFunctions);
        }
        let cap = max_iterations.unwrap_or(self.config.fuzzer.max_iterations);
        if cap == 0 {
            return Err(EngineError::InvalidIterations);
        }

        let run_id = Uuid::new_v4();
        let started_at = chrono::Local::now().to_rfc3339();
        info!(
            %run_id,
            project = %catalog.project_name,
            functions = catalog.functions.len(),
            cap,
            "starting run"
        );

        let mut state = RunState::default();
        let mut iterations = 0;
        let mut termination = Termination::IterationCap;

        for iteration in 1..=cap {
            let plan = self.planner.plan(
                catalog,
                &state.history,
                &state.tested,
                &self.assistant,
            );
            if plan.is_empty() {
                termination = Termination::SearchExhausted;
                break;
            }

            info!(iteration, combinations = plan.len(), "iteration started");
            for combination in plan {
                self.process(catalog, combination, &mut state);
            }
            iterations = iteration;

            state.history.push(state.aggregate);
            let line = state.aggregate.line_coverage();
            info!(
                iteration,
                line_coverage = line,
                tested = state.tested.len(),
                "iteration finished"
            );

            if line >= self.config.fuzzer.coverage_threshold {
                termination = Termination::ThresholdMet;
                break;
            }
        }

        let result = self.finish(catalog, run_id, started_at, termination, iterations, state);
        info!(%run_id, termination = %result.termination, "{}", result.summary);

        if let Err(e) = self.store.write_summary(&result) {
            warn!(error = %e, "failed to write run summary");
        }
        Ok(result)
    }

    fn process(&mut self, catalog: &Catalog, combination: Combination, state: &mut RunState) {
        let request = GenerationRequest {
            language: catalog.language,
            includes: &catalog.includes,
            targets: combination
                .names()
                .iter()
                .filter_map(|n| catalog.function(n))
                .collect(),
        };

        let code = match self.assistant.generate(&request) {
            Ok(code) if !code.trim().is_empty() => code,
            Ok(_) => {
                warn!(%combination, "generation returned no code, skipping");
                return;
            }
            Err(e) => {
                warn!(%combination, error = %e, "generation failed, skipping");
                return;
            }
        };

        let mut candidate = self.repair.repair_until_valid(
            HarnessCandidate::new(code, combination),
            &self.validator,
            &self.assistant,
            catalog.language,
        );
        state.tested.insert(candidate.combination.clone());

        if !candidate.compiled {
            info!(
                combination = %candidate.combination,
                errors = candidate.errors.len(),
                "harness failed"
            );
            self.persist(&candidate, HarnessStatus::Failed, catalog);
            state.failures.push(candidate);
            return;
        }

        info!(combination = %candidate.combination, "harness compiled");
        self.persist(&candidate, HarnessStatus::Success, catalog);

        let run = self
            .validator
            .quick_run(&candidate.code, catalog.language);
        candidate.ran = run.ok;
        if !run.ok {
            warn!(combination = %candidate.combination, "harness run reported a failure");
        }

        if let Some(sample) = parse_libfuzzer_output(&run.diagnostic) {
            candidate.coverage = Some(sample);
            let gain = state.aggregate.absorb(&sample);
            if gain > 0.0 {
                for name in candidate.targets() {
                    self.planner.reweight(name, gain);
                }
            }
        }

        state.successes.push(candidate);
    }

    fn persist(&self, candidate: &HarnessCandidate, status: HarnessStatus, catalog: &Catalog) {
        match self.store.save(candidate, status, catalog.language) {
            Ok(path) => info!(path = %path.display(), %status, "harness saved"),
            Err(e) => warn!(error = %e, "failed to save harness"),
        }
    }

    fn finish(
        &self,
        catalog: &Catalog,
        run_id: Uuid,
        started_at: String,
        termination: Termination,
        iterations: usize,
        state: RunState,
    ) -> RunResult {
        let line_coverage = state.aggregate.line_coverage();
        let branch_coverage = state.aggregate.branch_coverage();
        let summary = format!(
            "{} after {} iteration(s): {} tested, {} succeeded, {} failed, \
             line coverage {:.1}%, branch coverage {:.1}%",
            termination,
            iterations,
            state.tested.len(),
            state.successes.len(),
            state.failures.len(),
            line_coverage,
            branch_coverage,
        );

        RunResult {
            run_id,
            project: catalog.project_name.clone(),
            started_at,
            finished_at: chrono::Local::now().to_rfc3339(),
            termination,
            iterations,
            tested: state.tested.len(),
            successes: state.successes.len(),
            failures: state.failures.len(),
            line_coverage,
            branch_coverage,
            coverage: state.aggregate,
            summary,
            successful: state.successes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FunctionSignature, Language};
    use crate::fuzzer::validator::Validation;
    use crate::llm::prompt::SuggestionContext;
    use crate::llm::ServiceError;

    struct Quiet;

    impl HarnessGenerator for Quiet {
        fn generate(&self, _r: &GenerationRequest<'_>) -> Result<String, ServiceError> {
            Ok("int LLVMFuzzerTestOneInput(void) { return 0; }".into())
        }
    }

    impl HarnessRepairer for Quiet {
        fn repair(&self, code: &str, _d: &str, _l: Language) -> Result<String, ServiceError> {
            Ok(code.to_string())
        }
    }

    impl CombinationSuggester for Quiet {
        fn suggest(&self, _c: &SuggestionContext<'_>) -> Result<String, ServiceError> {
            Err(ServiceError::RateLimited)
        }
    }

    struct AlwaysOk;

    impl HarnessValidator for AlwaysOk {
        fn check_syntax(&self, _c: &str, _l: Language) -> Validation {
            Validation::pass("")
        }
        fn compile(&self, _c: &str, _l: Language) -> Validation {
            Validation::pass("")
        }
        fn quick_run(&self, _c: &str, _l: Language) -> Validation {
            Validation::pass("Done 64 runs in 1 second(s)")
        }
    }

    /// Replays libFuzzer output from a list, repeating the last entry.
    struct Replay {
        outputs: Vec<&'static str>,
        runs: std::cell::Cell<usize>,
    }

    impl HarnessValidator for Replay {
        fn check_syntax(&self, _c: &str, _l: Language) -> Validation {
            Validation::pass("")
        }
        fn compile(&self, _c: &str, _l: Language) -> Validation {
            Validation::pass("")
        }
        fn quick_run(&self, _c: &str, _l: Language) -> Validation {
            let n = self.runs.get();
            self.runs.set(n + 1);
            let out = self.outputs.get(n).or(self.outputs.last()).copied();
            Validation::pass(out.unwrap_or(""))
        }
    }

    fn engine(dir: &std::path::Path) -> Engine<Quiet, AlwaysOk> {
        let mut config = Config::default();
        config.output.output_dir = dir.to_path_buf();
        Engine::new(config, Quiet, AlwaysOk).unwrap()
    }

    fn function(name: &str, public: bool) -> FunctionSignature {
        FunctionSignature {
            name: name.into(),
            return_type: "void".into(),
            params: vec![],
            file_path: "x.c".into(),
            line: 1,
            is_public: public,
            docstring: None,
        }
    }

    #[test]
    fn rejects_unusable_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());

        let mut catalog = Catalog::new("empty", Language::C);
        assert!(matches!(
            engine.run(&catalog, Some(1)),
            Err(EngineError::EmptyCatalog)
        ));

        catalog.functions.push(function("helper", false));
        assert!(matches!(
            engine.run(&catalog, Some(1)),
            Err(EngineError::NoPublicFunctions)
        ));

        catalog.functions.push(function("api", true));
        assert!(matches!(
            engine.run(&catalog, Some(0)),
            Err(EngineError::InvalidIterations)
        ));
    }

    #[test]
    fn single_function_exhausts_search() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        let mut catalog = Catalog::new("one", Language::C);
        catalog.functions.push(function("api", true));

        let result = engine.run(&catalog, Some(10)).unwrap();

        assert_eq!(result.termination, Termination::SearchExhausted);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.tested, 1);
        assert_eq!(result.successes, 1);
        assert!(result.successful[0].ran);
        assert!(dir.path().join("summary.json").is_file());
    }

    #[test]
    fn only_coverage_gains_raise_weights() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.output_dir = dir.path().to_path_buf();
        let replay = Replay {
            outputs: vec![
                "INFO: Loaded 1 modules (100 inline 8-bit counters)\n#2 INITED cov: 50 ft: 50",
                "INFO: Loaded 1 modules (1000 inline 8-bit counters)\n#2 INITED cov: 10 ft: 10",
            ],
            runs: std::cell::Cell::new(0),
        };
        let mut engine = Engine::new(config, Quiet, replay)
            .unwrap()
            .with_planner(CombinationPlanner::with_rng(
                <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(3),
            ));

        let mut catalog = Catalog::new("two", Language::C);
        catalog.functions.push(function("a", true));
        catalog.functions.push(function("b", true));

        let result = engine.run(&catalog, Some(1)).unwrap();

        assert_eq!(result.line_coverage, 50.0);
        assert_eq!(result.coverage.total_lines, 100);
        assert!((engine.planner.weight("a") - 6.0).abs() < 1e-9);
        assert_eq!(engine.planner.weight("b"), 1.0);
    }
}
