//! Dispatch scheduling engines and their post-processing.
//!
//! [`milp::MilpOptimizer`] builds and solves the mixed-integer model under a
//! deadline; [`fallback::RuleBasedScheduler`] is the deterministic greedy
//! scheduler used when the solver cannot deliver. [`explain`] and [`kpi`]
//! derive per-step reasons and aggregate metrics from either result, and
//! [`validate`] checks the feasibility invariants both engines must satisfy.

pub mod explain;
pub mod fallback;
pub mod kpi;
pub mod milp;
pub mod validate;

use std::time::Duration;

use crate::domain::{DispatchProblem, Solution};
use crate::error::SolverFailureKind;

/// Big-M constant for the charge/import indicator constraints. No limit a
/// valid problem can declare exceeds this, so the linearization is exact.
pub const BIG_M: f64 = 1e6;

/// A step is peak-priced when its buy tariff exceeds this multiple of the
/// horizon's median buy tariff.
pub const PEAK_TARIFF_RATIO: f64 = 1.2;

/// A step is off-peak when its buy tariff falls below this multiple of the
/// median buy tariff.
pub const OFF_PEAK_TARIFF_RATIO: f64 = 0.8;

/// Capability boundary for the mixed-integer solve.
///
/// The core never talks to a solver library directly; it hands a problem and
/// a wall-clock deadline to an implementation of this trait. The deadline is
/// passed down as the solver's own time limit; callers additionally enforce
/// it from outside.
pub trait MilpBackend: Send + Sync {
    fn build_and_solve(
        &self,
        problem: &DispatchProblem,
        deadline: Duration,
    ) -> Result<Solution, SolverFailureKind>;
}

/// Median of a non-empty slice; the mean of the two middle values for even
/// lengths. Inputs are validated finite before reaching here.
pub(crate) fn median(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite tariff values"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
