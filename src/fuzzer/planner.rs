// src/fuzzer/planner.rs
//
// Decides which function combinations the next iteration tries.
// While coverage keeps climbing the cheap heuristic is used; once it
// stalls the suggestion service is asked for combinations instead.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::fuzzer::combination::{Combination, CombinationKey, TestedSet};
use crate::fuzzer::coverage::CoverageSample;
use crate::llm::prompt::SuggestionContext;
use crate::llm::CombinationSuggester;

pub const MAX_PER_PLAN: usize = 5;
const MAX_SINGLETONS: usize = 2;
const MAX_RANDOM: usize = 3;
const RANDOM_DRAWS: usize = 32;
const EXHAUSTIVE_POOL: usize = 16;
const STALL_GAIN: f64 = 5.0;
const STALL_MIN_SAMPLES: usize = 3;
const REWEIGHT_FACTOR: f64 = 0.1;
const RECENT_CONTEXT: usize = 10;
const PRIORITY_CONTEXT: usize = 5;

/// Line-coverage change between the last two samples; 100.0 until there
/// are two samples to compare.
pub fn coverage_gain(history: &[CoverageSample]) -> f64 {
    match history {
        [.., prev, last] => last.line_coverage() - prev.line_coverage(),
        _ => 100.0,
    }
}

/// Turns a suggestion reply into combinations of known function names.
///
/// One combination per line, names comma-separated, `-`/`*` bullets
/// allowed. Unknown names are dropped, as are lines left empty.
pub fn parse_suggestions(text: &str, catalog: &Catalog) -> Vec<Combination> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(|c: char| c == '-' || c == '*').trim();
            let names: Vec<&str> = line
                .split(',')
                .map(|t| t.trim().trim_matches('`'))
                .filter(|t| catalog.contains(t))
                .collect();
            (!names.is_empty()).then(|| Combination::new(names))
        })
        .take(MAX_PER_PLAN)
        .collect()
}

pub struct CombinationPlanner<R: Rng = StdRng> {
    weights: HashMap<String, f64>,
    rng: R,
}

impl CombinationPlanner<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for CombinationPlanner<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> CombinationPlanner<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            weights: HashMap::new(),
            rng,
        }
    }

    pub fn weight(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(1.0)
    }

    pub fn reweight(&mut self, name: &str, delta: f64) {
        *self.weights.entry(name.to_string()).or_insert(1.0) += REWEIGHT_FACTOR * delta;
    }

    /// Public functions by descending weight; ties keep catalog order.
    pub fn top_priority<'c>(&self, catalog: &'c Catalog, k: usize) -> Vec<&'c str> {
        let mut names = catalog.public_names();
        names.sort_by(|a, b| self.weight(b).total_cmp(&self.weight(a)));
        names.truncate(k);
        names
    }

    /// Up to five combinations, none of them already in `tested` and no
    /// two alike.
    pub fn plan(
        &mut self,
        catalog: &Catalog,
        history: &[CoverageSample],
        tested: &TestedSet,
        suggester: &dyn CombinationSuggester,
    ) -> Vec<Combination> {
        let gain = coverage_gain(history);

        if gain < STALL_GAIN && history.len() >= STALL_MIN_SAMPLES {
            debug!(gain, "coverage stalled, asking for suggestions");
            let suggested = self.suggested(catalog, history, tested, suggester);
            if !suggested.is_empty() {
                return suggested;
            }
            debug!("no usable suggestions, using heuristic plan");
        }

        self.heuristic(catalog, tested)
    }

    fn suggested(
        &self,
        catalog: &Catalog,
        history: &[CoverageSample],
        tested: &TestedSet,
        suggester: &dyn CombinationSuggester,
    ) -> Vec<Combination> {
        let coverage = history.last().copied().unwrap_or_default();
        let context = SuggestionContext {
            coverage: &coverage,
            recent: tested.recent(RECENT_CONTEXT),
            available: catalog.public_names(),
            priority: self.top_priority(catalog, PRIORITY_CONTEXT),
        };

        let reply = match suggester.suggest(&context) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "suggestion service failed");
                return Vec::new();
            }
        };

        let mut batch = Batch::new(tested);
        for combination in parse_suggestions(&reply, catalog) {
            batch.offer(combination);
        }
        batch.into_vec()
    }

    fn heuristic(&mut self, catalog: &Catalog, tested: &TestedSet) -> Vec<Combination> {
        let pool = catalog.public_names();
        let mut batch = Batch::new(tested);

        for name in &pool {
            if batch.len() >= MAX_SINGLETONS {
                break;
            }
            batch.offer(Combination::new([*name]));
        }

        if pool.len() >= 2 {
            let mut added = 0;
            for _ in 0..RANDOM_DRAWS {
                if added >= MAX_RANDOM || batch.len() >= MAX_PER_PLAN {
                    break;
                }
                let size = self.rng.gen_range(2..=3).min(pool.len());
                let picked = pool.choose_multiple(&mut self.rng, size).copied();
                if batch.offer(Combination::new(picked)) {
                    added += 1;
                }
            }

            // Random draws miss the last few untested sets; small pools
            // are walked in full so the search only ends when it is done.
            if added < MAX_RANDOM && pool.len() <= EXHAUSTIVE_POOL {
                for combination in pairs_and_triples(&pool) {
                    if added >= MAX_RANDOM || batch.len() >= MAX_PER_PLAN {
                        break;
                    }
                    if batch.offer(combination) {
                        added += 1;
                    }
                }
            }
        }

        batch.into_vec()
    }
}

/// Every pair, then every triple, in catalog order.
fn pairs_and_triples<'p>(pool: &'p [&'p str]) -> impl Iterator<Item = Combination> + 'p {
    let n = pool.len();
    let pairs = (0..n)
        .flat_map(move |i| (i + 1..n).map(move |j| Combination::new([pool[i], pool[j]])));
    let triples = (0..n).flat_map(move |i| {
        (i + 1..n).flat_map(move |j| {
            (j + 1..n).map(move |k| Combination::new([pool[i], pool[j], pool[k]]))
        })
    });
    pairs.chain(triples)
}

/// One plan under construction; rejects anything tested or already queued.
struct Batch<'t> {
    tested: &'t TestedSet,
    seen: HashSet<CombinationKey>,
    out: Vec<Combination>,
}

impl<'t> Batch<'t> {
    fn new(tested: &'t TestedSet) -> Self {
        Self {
            tested,
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.out.len()
    }

    fn offer(&mut self, combination: Combination) -> bool {
        if combination.is_empty() || self.out.len() >= MAX_PER_PLAN {
            return false;
        }
        let key = combination.key();
        if self.tested.contains_key(&key) || !self.seen.insert(key) {
            return false;
        }
        self.out.push(combination);
        true
    }

    fn into_vec(self) -> Vec<Combination> {
        self.out
    }
}
