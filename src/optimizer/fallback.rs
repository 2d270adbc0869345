//! Deterministic rule-based scheduler.
//!
//! Invoked when the MILP solver fails or when the caller requests the rule
//! path explicitly. Returns a feasible schedule for any well-formed problem
//! via a single greedy sweep: PV serves load first, the battery discharges
//! into peak-priced steps and charges from PV surplus (or from the grid in
//! off-peak steps), and the grid absorbs whatever remains within its limits.
//!
//! The scheduler makes no attempt to chase the MILP optimum; feasibility is
//! its only contract. In particular it never exploits `tariff_sell >
//! tariff_buy` arbitrage windows, which the MILP objective does pick up.

use tracing::warn;

use crate::domain::{DispatchProblem, Solution, SolverKind};
use crate::optimizer::validate::POWER_TOLERANCE_KW;
use crate::optimizer::{median, OFF_PEAK_TARIFF_RATIO, PEAK_TARIFF_RATIO};

/// A fallback schedule plus the largest power imbalance the reconciliation
/// pass could not absorb (0 for a fully served horizon).
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub solution: Solution,
    pub max_residual_kw: f64,
}

pub struct RuleBasedScheduler;

impl RuleBasedScheduler {
    /// Build a feasible schedule for `problem`. Never fails; extreme inputs
    /// (load exceeding every supply source) yield a best-effort schedule
    /// with the unserved remainder reported in
    /// [`FallbackOutcome::max_residual_kw`].
    pub fn schedule(problem: &DispatchProblem) -> FallbackOutcome {
        let t_len = problem.t_len();
        let bess = &problem.bess;
        let limits = &problem.limits;
        let dt = problem.dt_hours;

        let med = median(&problem.tariff_buy);
        let is_peak: Vec<bool> = problem
            .tariff_buy
            .iter()
            .map(|b| *b > PEAK_TARIFF_RATIO * med)
            .collect();
        let is_off_peak: Vec<bool> = problem
            .tariff_buy
            .iter()
            .map(|b| *b < OFF_PEAK_TARIFF_RATIO * med)
            .collect();

        let mut pv_set_kw = vec![0.0; t_len];
        let mut batt_ch_kw = vec![0.0; t_len];
        let mut batt_dis_kw = vec![0.0; t_len];
        let mut grid_imp_kw = vec![0.0; t_len];
        let mut grid_exp_kw = vec![0.0; t_len];
        let mut curtail_kw = vec![0.0; t_len];
        let mut soc = Vec::with_capacity(t_len + 1);
        soc.push(bess.soc0);
        let mut soc_now = bess.soc0;

        for t in 0..t_len {
            let pv = problem.pv_forecast_kw[t];
            let load = problem.load_kw[t];
            let pv_to_load = pv.min(load);
            let mut pv_surplus = pv - pv_to_load;

            // Power the battery can absorb or deliver this step without
            // leaving the SOC band.
            let charge_headroom_kw =
                ((bess.soc_max - soc_now) * bess.capacity_kwh / (bess.eta_charge * dt)).max(0.0);
            let discharge_headroom_kw =
                ((soc_now - bess.soc_min) * bess.capacity_kwh * bess.eta_discharge / dt).max(0.0);

            let mut ch = 0.0;
            let mut dis = 0.0;
            if is_peak[t] && soc_now > bess.soc_min {
                dis = bess
                    .p_discharge_max_kw
                    .min((load - pv_to_load).max(0.0))
                    .min(discharge_headroom_kw);
            } else if pv_surplus > 0.0 && soc_now < bess.soc_max {
                ch = bess
                    .p_charge_max_kw
                    .min(pv_surplus)
                    .min(charge_headroom_kw);
                pv_surplus -= ch;
            } else if is_off_peak[t] && soc_now < bess.soc_max {
                // Grid-sourced charging; the import limit is applied when
                // the step is balanced below.
                ch = bess.p_charge_max_kw.min(charge_headroom_kw);
            }

            let mut exp = pv_surplus.min(limits.grid_export_max_kw);
            let mut curt = pv_surplus - exp;
            let mut used_pv = pv - curt;

            let mut imp = 0.0;
            let residual = load + ch + exp - used_pv - dis;
            if residual > 0.0 {
                imp = residual.min(limits.grid_import_max_kw);
                let deficit = residual - imp;
                if deficit > 0.0 {
                    // Only grid-sourced charging can be given back here;
                    // PV-sourced charging always balances within the step.
                    // Anything left over is unservable and handled by the
                    // reconciliation pass below.
                    ch -= ch.min(deficit);
                }
            } else if residual < 0.0 {
                let extra = (-residual).min(limits.grid_export_max_kw - exp);
                exp += extra;
                let spill = -residual - extra;
                curt += spill;
                used_pv -= spill;
            }

            soc_now += (bess.eta_charge * ch - dis / bess.eta_discharge) * dt / bess.capacity_kwh;
            soc_now = soc_now.clamp(bess.soc_min, bess.soc_max);

            pv_set_kw[t] = used_pv;
            batt_ch_kw[t] = ch;
            batt_dis_kw[t] = dis;
            grid_imp_kw[t] = imp;
            grid_exp_kw[t] = exp;
            curtail_kw[t] = curt;
            soc.push(soc_now);
        }

        // Reconciliation: absorb any residual imbalance into curtailment
        // (oversupply) or grid import up to its limit (deficit).
        let mut max_residual_kw: f64 = 0.0;
        for t in 0..t_len {
            let imbalance = pv_set_kw[t] + batt_dis_kw[t] + grid_imp_kw[t]
                - (problem.load_kw[t] + batt_ch_kw[t] + grid_exp_kw[t]);
            if imbalance > POWER_TOLERANCE_KW {
                let shed = imbalance.min(pv_set_kw[t]);
                pv_set_kw[t] -= shed;
                curtail_kw[t] += shed;
                max_residual_kw = max_residual_kw.max(imbalance - shed);
            } else if imbalance < -POWER_TOLERANCE_KW {
                let need = -imbalance;
                let extra = need.min(limits.grid_import_max_kw - grid_imp_kw[t]).max(0.0);
                grid_imp_kw[t] += extra;
                let rest = need - extra;
                if rest > POWER_TOLERANCE_KW {
                    warn!(
                        site_id = %problem.site_id,
                        t,
                        unserved_kw = rest,
                        "load not fully servable within grid and battery limits"
                    );
                    max_residual_kw = max_residual_kw.max(rest);
                }
            }
        }

        FallbackOutcome {
            solution: Solution {
                pv_set_kw,
                batt_ch_kw,
                batt_dis_kw,
                grid_imp_kw,
                grid_exp_kw,
                curtail_kw,
                soc,
                solver_kind: SolverKind::Fallback,
                objective_value: None,
                active_constraints: vec![Vec::new(); t_len],
            },
            max_residual_kw,
        }
    }
}
