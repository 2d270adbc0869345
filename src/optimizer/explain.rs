//! Per-timestep reasons for dispatch decisions.
//!
//! Each step gets one short sentence chosen by the first matching rule in a
//! fixed priority order: discharge reasons first, then charge, then
//! curtailment, then SOC guard rails, with plain grid import as the default.
//! When the MILP reported binding bounds for a step, they are appended to
//! the chosen reason.

use crate::domain::{DispatchProblem, Solution};
use crate::optimizer::{median, OFF_PEAK_TARIFF_RATIO, PEAK_TARIFF_RATIO};

/// Powers below this threshold are treated as zero, in kW.
pub const EPSILON_KW: f64 = 0.01;

/// Load above this multiple of the median load counts as a demand peak.
const DEMAND_PEAK_RATIO: f64 = 1.5;

/// Fraction of a grid limit at which it is reported as the driving factor.
const LIMIT_PRESSURE_RATIO: f64 = 0.95;

/// SOC margin within which the battery is considered at its band edge.
const SOC_MARGIN: f64 = 0.05;

/// Produce one reason per timestep. Deterministic: the same solution and
/// problem always yield the same strings.
pub fn explain(problem: &DispatchProblem, solution: &Solution) -> Vec<String> {
    let med_buy = median(&problem.tariff_buy);
    let med_load = median(&problem.load_kw);

    (0..solution.t_len())
        .map(|t| {
            let base = base_reason(problem, solution, t, med_buy, med_load);
            match solution.active_constraints.get(t) {
                Some(tags) if !tags.is_empty() => {
                    let list = tags
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{base}; active: [{list}]")
                }
                _ => base.to_string(),
            }
        })
        .collect()
}

fn base_reason(
    problem: &DispatchProblem,
    solution: &Solution,
    t: usize,
    med_buy: f64,
    med_load: f64,
) -> &'static str {
    let ch = solution.batt_ch_kw[t];
    let dis = solution.batt_dis_kw[t];
    let imp = solution.grid_imp_kw[t];
    let exp = solution.grid_exp_kw[t];
    let curt = solution.curtail_kw[t];
    let buy = problem.tariff_buy[t];
    let load = problem.load_kw[t];
    let pv = problem.pv_forecast_kw[t];
    let soc_end = solution.soc[t + 1];
    let bess = &problem.bess;
    let limits = &problem.limits;

    if dis > EPSILON_KW && buy > PEAK_TARIFF_RATIO * med_buy {
        "Discharge battery during peak tariff hours"
    } else if dis > EPSILON_KW && load > DEMAND_PEAK_RATIO * med_load {
        "Discharge battery to meet demand peak"
    } else if dis > EPSILON_KW && imp >= LIMIT_PRESSURE_RATIO * limits.grid_import_max_kw {
        "Discharge battery due to grid import limit"
    } else if ch > EPSILON_KW && curt > EPSILON_KW {
        "Charge battery using curtailed PV"
    } else if ch > EPSILON_KW && buy < OFF_PEAK_TARIFF_RATIO * med_buy {
        "Charge battery during low tariff hours"
    } else if ch > EPSILON_KW && pv > load {
        "Charge battery with excess PV after load met"
    } else if curt > EPSILON_KW && soc_end >= bess.soc_max - SOC_MARGIN {
        "Curtail PV due to battery at max SOC"
    } else if curt > EPSILON_KW && exp >= LIMIT_PRESSURE_RATIO * limits.grid_export_max_kw {
        "Curtail PV due to grid export limit"
    } else if curt > EPSILON_KW {
        "Curtail PV for economic optimization"
    } else if soc_end <= bess.soc_min + SOC_MARGIN {
        "SOC protected at minimum threshold"
    } else if soc_end >= bess.soc_max - SOC_MARGIN {
        "SOC approaching maximum limit"
    } else {
        "Grid import to meet demand"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BessParams, ConstraintTag, GridLimits, ObjectiveWeights, SolverKind,
    };

    fn problem() -> DispatchProblem {
        DispatchProblem {
            site_id: "site-1".into(),
            dt_hours: 0.25,
            pv_forecast_kw: vec![0.0, 0.0, 0.0, 0.0],
            load_kw: vec![20.0, 20.0, 20.0, 20.0],
            tariff_buy: vec![0.3, 0.3, 1.0, 0.3],
            tariff_sell: vec![0.1; 4],
            bess: BessParams::default(),
            limits: GridLimits::default(),
            weights: ObjectiveWeights::default(),
        }
    }

    fn idle_solution(t_len: usize, soc: f64) -> Solution {
        Solution {
            pv_set_kw: vec![0.0; t_len],
            batt_ch_kw: vec![0.0; t_len],
            batt_dis_kw: vec![0.0; t_len],
            grid_imp_kw: vec![20.0; t_len],
            grid_exp_kw: vec![0.0; t_len],
            curtail_kw: vec![0.0; t_len],
            soc: vec![soc; t_len + 1],
            solver_kind: SolverKind::Fallback,
            objective_value: None,
            active_constraints: vec![Vec::new(); t_len],
        }
    }

    #[test]
    fn peak_discharge_outranks_everything() {
        let p = problem();
        let mut s = idle_solution(4, 0.5);
        s.batt_dis_kw[2] = 20.0;
        s.grid_imp_kw[2] = 0.0;
        let reasons = explain(&p, &s);
        assert_eq!(reasons[2], "Discharge battery during peak tariff hours");
    }

    #[test]
    fn demand_peak_reason_applies_without_tariff_peak() {
        let mut p = problem();
        p.tariff_buy = vec![0.3; 4];
        p.load_kw = vec![20.0, 20.0, 60.0, 20.0];
        let mut s = idle_solution(4, 0.5);
        s.batt_dis_kw[2] = 10.0;
        s.grid_imp_kw[2] = 50.0;
        let reasons = explain(&p, &s);
        assert_eq!(reasons[2], "Discharge battery to meet demand peak");
    }

    #[test]
    fn charge_from_curtailed_pv_beats_low_tariff() {
        let mut p = problem();
        p.tariff_buy = vec![0.1, 0.5, 0.5, 0.5];
        p.pv_forecast_kw = vec![120.0, 0.0, 0.0, 0.0];
        let mut s = idle_solution(4, 0.5);
        s.batt_ch_kw[0] = 50.0;
        s.curtail_kw[0] = 30.0;
        s.pv_set_kw[0] = 90.0;
        s.grid_imp_kw[0] = 0.0;
        s.grid_exp_kw[0] = 20.0;
        let reasons = explain(&p, &s);
        assert_eq!(reasons[0], "Charge battery using curtailed PV");
    }

    #[test]
    fn soc_floor_reason_for_idle_battery() {
        let p = problem();
        let s = idle_solution(4, 0.21);
        let reasons = explain(&p, &s);
        assert_eq!(reasons[0], "SOC protected at minimum threshold");
    }

    #[test]
    fn default_reason_is_grid_import() {
        let p = problem();
        let reasons = explain(&p, &idle_solution(4, 0.5));
        assert_eq!(reasons[0], "Grid import to meet demand");
        assert_eq!(reasons[3], "Grid import to meet demand");
    }

    #[test]
    fn active_constraints_are_appended() {
        let p = problem();
        let mut s = idle_solution(4, 0.5);
        s.active_constraints[1] = vec![ConstraintTag::SocMax, ConstraintTag::PChargeMax];
        let reasons = explain(&p, &s);
        assert_eq!(
            reasons[1],
            "Grid import to meet demand; active: [soc_max, p_charge_max]"
        );
    }

    #[test]
    fn explanations_are_idempotent() {
        let p = problem();
        let s = idle_solution(4, 0.5);
        assert_eq!(explain(&p, &s), explain(&p, &s));
    }
}
