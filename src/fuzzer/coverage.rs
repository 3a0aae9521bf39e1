// src/fuzzer/coverage.rs
//
// Coverage numbers reported by a harness run.
// Nothing here instruments code; samples are parsed from the run's output.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSample {
    pub total_lines: u64,
    pub covered_lines: u64,
    pub total_branches: u64,
    pub covered_branches: u64,
    pub new_paths: u64,
}

impl CoverageSample {
    pub fn line_coverage(&self) -> f64 {
        percent(self.covered_lines, self.total_lines)
    }

    pub fn branch_coverage(&self) -> f64 {
        percent(self.covered_branches, self.total_branches)
    }

    /// Folds a new sample into a running aggregate.
    ///
    /// The first non-zero totals become the aggregate's denominators; later
    /// samples are rescaled onto them before the covered counts take the max,
    /// so the percentages never drop even when binaries differ in size.
    /// `new_paths` accumulates. Returns the line-coverage gain in percentage
    /// points (never negative).
    pub fn absorb(&mut self, sample: &CoverageSample) -> f64 {
        let before = self.line_coverage();

        fold(
            &mut self.covered_lines,
            &mut self.total_lines,
            sample.covered_lines,
            sample.total_lines,
        );
        fold(
            &mut self.covered_branches,
            &mut self.total_branches,
            sample.covered_branches,
            sample.total_branches,
        );
        self.new_paths += sample.new_paths;

        (self.line_coverage() - before).max(0.0)
    }
}

fn fold(covered: &mut u64, total: &mut u64, sample_covered: u64, sample_total: u64) {
    if sample_total == 0 {
        return;
    }
    if *total == 0 {
        *total = sample_total;
    }
    let scaled = u128::from(sample_covered.min(sample_total)) * u128::from(*total)
        / u128::from(sample_total);
    let scaled = u64::try_from(scaled).unwrap_or(*total);
    *covered = (*covered).max(scaled).min(*total);
}

fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 * 100.0 / total as f64
    }
}

/* ============================================================
   libFuzzer output
   ============================================================ */

fn counters_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+) inline 8-bit counters\)").expect("valid regex"))
}

fn pcs_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PC tables? \((\d+) PCs\)").expect("valid regex"))
}

fn stats_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bcov:\s*(\d+)(?:\s+ft:\s*(\d+))?").expect("valid regex"))
}

/// Extracts a sample from libFuzzer's status lines.
///
/// - `cov:` is the number of covered edges (taken as covered lines)
/// - `ft:` is the feature count (taken as covered branches)
/// - the inline counter total is the line denominator, the PC table size the
///   branch denominator
/// - every `NEW` status line counts as one new path
///
/// Returns `None` when the output carries no `cov:` figure at all.
pub fn parse_libfuzzer_output(output: &str) -> Option<CoverageSample> {
    let mut sample = CoverageSample::default();
    let mut seen = false;

    for line in output.lines() {
        if let Some(c) = counters_regex().captures(line) {
            let n = c[1].parse::<u64>().unwrap_or(0);
            sample.total_lines = sample.total_lines.max(n);
        }

        if let Some(c) = pcs_regex().captures(line) {
            let n = c[1].parse::<u64>().unwrap_or(0);
            sample.total_branches = sample.total_branches.max(n);
        }

        if let Some(c) = stats_regex().captures(line) {
            seen = true;
            let cov = c[1].parse::<u64>().unwrap_or(0);
            sample.covered_lines = sample.covered_lines.max(cov);

            if let Some(ft) = c.get(2).and_then(|m| m.as_str().parse::<u64>().ok()) {
                sample.covered_branches = sample.covered_branches.max(ft);
            }

            if line.contains(" NEW ") || line.contains("\tNEW ") {
                sample.new_paths += 1;
            }
        }
    }

    // feature counts may exceed the PC table; keep the ratio meaningful
    if sample.total_branches < sample.covered_branches {
        sample.total_branches = sample.covered_branches;
    }
    if sample.total_lines < sample.covered_lines {
        sample.total_lines = sample.covered_lines;
    }

    seen.then_some(sample)
}
