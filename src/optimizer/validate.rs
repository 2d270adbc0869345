//! Feasibility checks shared by both scheduling engines.
//!
//! Every returned schedule must satisfy, at each step: power balance, PV
//! decomposition, charge/discharge and import/export mutual exclusivity, SOC
//! bounds and dynamics, and the declared variable limits.

use std::fmt;

use crate::domain::{DispatchProblem, Solution};

/// Tolerance for power-balance style checks, in kW.
pub const POWER_TOLERANCE_KW: f64 = 0.01;

/// Tolerance for SOC bound checks.
pub const SOC_TOLERANCE: f64 = 1e-6;

/// A single invariant violated at one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub t: usize,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}: {}", self.t, self.detail)
    }
}

/// Check all feasibility invariants of `solution` against `problem`.
///
/// Returns an empty vector for a feasible schedule. Array-length mismatches
/// are reported as a single violation at `t = 0` since per-step checks are
/// meaningless in that case.
pub fn check(problem: &DispatchProblem, solution: &Solution) -> Vec<Violation> {
    let t_len = problem.t_len();
    let mut violations = Vec::new();

    if solution.pv_set_kw.len() != t_len
        || solution.batt_ch_kw.len() != t_len
        || solution.batt_dis_kw.len() != t_len
        || solution.grid_imp_kw.len() != t_len
        || solution.grid_exp_kw.len() != t_len
        || solution.curtail_kw.len() != t_len
        || solution.soc.len() != t_len + 1
    {
        violations.push(Violation {
            t: 0,
            detail: format!("schedule arrays do not match horizon length {t_len}"),
        });
        return violations;
    }

    let bess = &problem.bess;
    let limits = &problem.limits;
    let dt = problem.dt_hours;

    for t in 0..t_len {
        let pv_set = solution.pv_set_kw[t];
        let ch = solution.batt_ch_kw[t];
        let dis = solution.batt_dis_kw[t];
        let imp = solution.grid_imp_kw[t];
        let exp = solution.grid_exp_kw[t];
        let curt = solution.curtail_kw[t];

        let supply = pv_set + dis + imp;
        let demand = problem.load_kw[t] + ch + exp;
        if (supply - demand).abs() > POWER_TOLERANCE_KW {
            violations.push(Violation {
                t,
                detail: format!("power imbalance: supply {supply:.4} vs demand {demand:.4}"),
            });
        }

        let pv_total = pv_set + curt;
        if (pv_total - problem.pv_forecast_kw[t]).abs() > POWER_TOLERANCE_KW {
            violations.push(Violation {
                t,
                detail: format!(
                    "pv decomposition: {pv_total:.4} vs forecast {:.4}",
                    problem.pv_forecast_kw[t]
                ),
            });
        }

        if ch * dis > POWER_TOLERANCE_KW {
            violations.push(Violation {
                t,
                detail: format!("simultaneous charge {ch:.4} and discharge {dis:.4}"),
            });
        }
        if imp * exp > POWER_TOLERANCE_KW {
            violations.push(Violation {
                t,
                detail: format!("simultaneous import {imp:.4} and export {exp:.4}"),
            });
        }

        for (name, value, upper) in [
            ("pv_set", pv_set, problem.pv_forecast_kw[t]),
            ("batt_ch", ch, bess.p_charge_max_kw),
            ("batt_dis", dis, bess.p_discharge_max_kw),
            ("grid_imp", imp, limits.grid_import_max_kw),
            ("grid_exp", exp, limits.grid_export_max_kw),
            ("curtail", curt, problem.pv_forecast_kw[t]),
        ] {
            if value < -POWER_TOLERANCE_KW {
                violations.push(Violation {
                    t,
                    detail: format!("{name} is negative: {value:.4}"),
                });
            }
            if value > upper + POWER_TOLERANCE_KW {
                violations.push(Violation {
                    t,
                    detail: format!("{name} {value:.4} exceeds limit {upper:.4}"),
                });
            }
        }

        let soc_next = solution.soc[t]
            + (bess.eta_charge * ch - dis / bess.eta_discharge) * dt / bess.capacity_kwh;
        if (soc_next - solution.soc[t + 1]).abs() > SOC_TOLERANCE {
            violations.push(Violation {
                t,
                detail: format!(
                    "soc dynamics: expected {soc_next:.6}, got {:.6}",
                    solution.soc[t + 1]
                ),
            });
        }
    }

    for (t, soc) in solution.soc.iter().enumerate() {
        if *soc < bess.soc_min - SOC_TOLERANCE || *soc > bess.soc_max + SOC_TOLERANCE {
            violations.push(Violation {
                t,
                detail: format!(
                    "soc {soc:.6} outside [{}, {}]",
                    bess.soc_min, bess.soc_max
                ),
            });
        }
    }

    violations
}
