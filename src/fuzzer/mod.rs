//! Harness search: planning, validation, repair and the loop tying them
//! together.

pub mod candidate;
pub mod combination;
pub mod coverage;
pub mod engine;
pub mod planner;
pub mod process;
pub mod repair;
pub mod store;
pub mod validator;

pub use candidate::{CodeError, ErrorKind, HarnessCandidate, Severity};
pub use combination::{Combination, CombinationKey, TestedSet};
pub use coverage::CoverageSample;
pub use engine::{Engine, EngineError, RunResult, Termination};
pub use planner::CombinationPlanner;
pub use repair::{classify, RepairLoop};
pub use store::{HarnessStatus, HarnessStore, StoreError, StoredHarness};
pub use validator::{HarnessValidator, Validation, Validator};
