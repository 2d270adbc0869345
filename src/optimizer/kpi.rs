//! Aggregate metrics derived from a dispatch schedule.
//!
//! All energy sums use the same `dt_hours` the solver used and no rounding is
//! applied to intermediate values, so KPIs recomputed from a returned
//! schedule reproduce these numbers exactly.

use serde::{Deserialize, Serialize};

use crate::domain::{DispatchProblem, Solution};
use crate::optimizer::explain::EPSILON_KW;

/// Key performance indicators for one dispatch run.
///
/// The first four fields are the headline metrics; the rest support
/// reporting and baseline comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_cost: f64,
    pub total_curtail_kwh: f64,
    pub peak_grid_import_kw: f64,
    pub avg_soc: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub batt_charge_kwh: f64,
    pub batt_discharge_kwh: f64,
    pub soc_min_reached: f64,
    pub soc_max_reached: f64,
    pub total_buy_cost: f64,
    pub total_sell_revenue: f64,
    pub net_energy_kwh: f64,
    pub self_consumption_rate: f64,
}

/// Compute all KPIs for `solution` under the tariffs of `problem`.
pub fn calculate(problem: &DispatchProblem, solution: &Solution) -> Kpis {
    let dt = problem.dt_hours;
    let t_len = solution.t_len();

    let mut total_buy_cost = 0.0;
    let mut total_sell_revenue = 0.0;
    for t in 0..t_len {
        total_buy_cost += problem.tariff_buy[t] * solution.grid_imp_kw[t] * dt;
        total_sell_revenue += problem.tariff_sell[t] * solution.grid_exp_kw[t] * dt;
    }

    let sum_kwh = |values: &[f64]| values.iter().sum::<f64>() * dt;
    let grid_import_kwh = sum_kwh(&solution.grid_imp_kw);
    let grid_export_kwh = sum_kwh(&solution.grid_exp_kw);

    let pv_forecast_total: f64 = problem.pv_forecast_kw.iter().sum();
    let pv_used_total: f64 = solution.pv_set_kw.iter().sum();

    Kpis {
        total_cost: total_buy_cost - total_sell_revenue,
        total_curtail_kwh: sum_kwh(&solution.curtail_kw),
        peak_grid_import_kw: solution.grid_imp_kw.iter().copied().fold(0.0, f64::max),
        avg_soc: solution.soc.iter().sum::<f64>() / solution.soc.len() as f64,
        grid_import_kwh,
        grid_export_kwh,
        batt_charge_kwh: sum_kwh(&solution.batt_ch_kw),
        batt_discharge_kwh: sum_kwh(&solution.batt_dis_kw),
        soc_min_reached: solution.soc.iter().copied().fold(f64::INFINITY, f64::min),
        soc_max_reached: solution.soc.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        total_buy_cost,
        total_sell_revenue,
        net_energy_kwh: grid_import_kwh - grid_export_kwh,
        self_consumption_rate: pv_used_total / pv_forecast_total.max(EPSILON_KW),
    }
}

/// Savings of one schedule over a baseline (e.g. the same horizon dispatched
/// without a battery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub cost_savings: f64,
    pub cost_savings_pct: f64,
    pub peak_reduction_kw: f64,
    pub curtail_reduction_kwh: f64,
}

/// Compare `optimized` KPIs against a `baseline` run of the same horizon.
pub fn compare(optimized: &Kpis, baseline: &Kpis) -> Savings {
    let cost_savings = baseline.total_cost - optimized.total_cost;
    let cost_savings_pct = if baseline.total_cost > 0.0 {
        cost_savings / baseline.total_cost * 100.0
    } else {
        0.0
    };
    Savings {
        cost_savings,
        cost_savings_pct,
        peak_reduction_kw: baseline.peak_grid_import_kw - optimized.peak_grid_import_kw,
        curtail_reduction_kwh: baseline.total_curtail_kwh - optimized.total_curtail_kwh,
    }
}

impl Kpis {
    /// Human-readable block for operator logs and reports.
    pub fn summary(&self) -> String {
        format!(
            "total cost {:.2} (buy {:.2} / sell {:.2}), peak import {:.2} kW, \
             curtailed {:.2} kWh, battery {:.2} kWh in / {:.2} kWh out, \
             SOC avg {:.1}% (range {:.1}%..{:.1}%), self-consumption {:.1}%",
            self.total_cost,
            self.total_buy_cost,
            self.total_sell_revenue,
            self.peak_grid_import_kw,
            self.total_curtail_kwh,
            self.batt_charge_kwh,
            self.batt_discharge_kwh,
            self.avg_soc * 100.0,
            self.soc_min_reached * 100.0,
            self.soc_max_reached * 100.0,
            self.self_consumption_rate * 100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BessParams, GridLimits, ObjectiveWeights, SolverKind,
    };
    use float_cmp::assert_approx_eq;

    fn problem() -> DispatchProblem {
        DispatchProblem {
            site_id: "site-1".into(),
            dt_hours: 0.25,
            pv_forecast_kw: vec![0.0; 4],
            load_kw: vec![10.0; 4],
            tariff_buy: vec![0.3; 4],
            tariff_sell: vec![0.1; 4],
            bess: BessParams::default(),
            limits: GridLimits::default(),
            weights: ObjectiveWeights::default(),
        }
    }

    fn all_grid_solution() -> Solution {
        Solution {
            pv_set_kw: vec![0.0; 4],
            batt_ch_kw: vec![0.0; 4],
            batt_dis_kw: vec![0.0; 4],
            grid_imp_kw: vec![10.0; 4],
            grid_exp_kw: vec![0.0; 4],
            curtail_kw: vec![0.0; 4],
            soc: vec![0.5; 5],
            solver_kind: SolverKind::Fallback,
            objective_value: None,
            active_constraints: vec![Vec::new(); 4],
        }
    }

    #[test]
    fn flat_import_horizon_costs_add_up() {
        let kpis = calculate(&problem(), &all_grid_solution());
        assert_approx_eq!(f64, kpis.total_cost, 3.0);
        assert_approx_eq!(f64, kpis.grid_import_kwh, 10.0);
        assert_eq!(kpis.peak_grid_import_kw, 10.0);
        assert_approx_eq!(f64, kpis.avg_soc, 0.5);
        assert_eq!(kpis.total_curtail_kwh, 0.0);
        assert_eq!(kpis.net_energy_kwh, kpis.grid_import_kwh);
        // No PV in the forecast: self-consumption degenerates to zero.
        assert_eq!(kpis.self_consumption_rate, 0.0);
    }

    #[test]
    fn recomputation_is_exact() {
        let p = problem();
        let s = all_grid_solution();
        let a = calculate(&p, &s);
        let b = calculate(&p, &s);
        assert_eq!(a, b);
    }

    #[test]
    fn export_revenue_offsets_cost() {
        let mut p = problem();
        p.pv_forecast_kw = vec![30.0; 4];
        let mut s = all_grid_solution();
        s.grid_imp_kw = vec![0.0; 4];
        s.pv_set_kw = vec![30.0; 4];
        s.grid_exp_kw = vec![20.0; 4];
        let kpis = calculate(&p, &s);
        assert_approx_eq!(f64, kpis.total_cost, -2.0);
        assert_approx_eq!(f64, kpis.total_sell_revenue, 2.0);
        assert_approx_eq!(f64, kpis.self_consumption_rate, 1.0);
        assert_approx_eq!(f64, kpis.net_energy_kwh, -20.0);
    }

    #[test]
    fn savings_compare_against_baseline() {
        let p = problem();
        let optimized = calculate(&p, &all_grid_solution());
        let mut worse = all_grid_solution();
        worse.grid_imp_kw = vec![20.0; 4];
        // Double the import, double the cost; the imbalance does not matter
        // for KPI arithmetic.
        let baseline = calculate(&p, &worse);
        let savings = compare(&optimized, &baseline);
        assert_approx_eq!(f64, savings.cost_savings, 3.0);
        assert_approx_eq!(f64, savings.cost_savings_pct, 50.0);
        assert_approx_eq!(f64, savings.peak_reduction_kw, 10.0);
    }

    #[test]
    fn summary_contains_headline_numbers() {
        let kpis = calculate(&problem(), &all_grid_solution());
        let text = kpis.summary();
        assert!(text.contains("total cost 3.00"));
        assert!(text.contains("peak import 10.00 kW"));
    }
}
