//! Mixed-integer dispatch model and HiGHS driver.
//!
//! Decision variables per step: utilized PV, battery charge/discharge, grid
//! import/export, curtailment, plus binary charge/import direction
//! indicators; SOC is tracked over `T + 1` samples and a single global slack
//! variable softens the transformer limit. The objective minimizes weighted
//! energy cost, curtailed energy and transformer violation.
//!
//! Columns are added in fixed blocks so solution values can be read back by
//! index range, and constraint rows reference columns directly.

use std::ops::Range;
use std::time::Duration;

use highs::{Col, HighsModelStatus, RowProblem, Sense};
use tracing::debug;

use crate::domain::{ConstraintTag, DispatchProblem, Solution, SolverKind};
use crate::error::SolverFailureKind;
use crate::optimizer::{MilpBackend, BIG_M};

/// Tolerance for the binding-bound scan: ratio against power limits,
/// absolute against SOC bounds.
const ACTIVE_SET_TOL: f64 = 1e-3;

/// Values this close to zero are snapped to zero when extracting a solution.
const EXTRACT_EPS: f64 = 1e-9;

/// MILP dispatch optimizer backed by HiGHS.
#[derive(Debug, Clone)]
pub struct MilpOptimizer {
    /// Relative optimality gap at which the solve is accepted.
    pub mip_rel_gap: f64,
    /// Solver thread count; each request owns its solver instance, so
    /// parallelism across requests comes from the caller.
    pub threads: u32,
}

impl Default for MilpOptimizer {
    fn default() -> Self {
        Self {
            mip_rel_gap: 0.01,
            threads: 1,
        }
    }
}

/// Column index ranges for each variable block, in insertion order.
struct VariableBlocks {
    pv_set: Range<usize>,
    batt_ch: Range<usize>,
    batt_dis: Range<usize>,
    grid_imp: Range<usize>,
    grid_exp: Range<usize>,
    curtail: Range<usize>,
    soc: Range<usize>,
}

fn build_model(problem: &DispatchProblem) -> (RowProblem, VariableBlocks) {
    let t_len = problem.t_len();
    let bess = &problem.bess;
    let limits = &problem.limits;
    let weights = &problem.weights;
    let dt = problem.dt_hours;

    let mut lp = RowProblem::default();

    let block = |lp: &mut RowProblem, cols: &[Col]| {
        let end = lp.num_cols();
        end - cols.len()..end
    };

    let pv_set: Vec<Col> = (0..t_len)
        .map(|t| lp.add_column(0.0, 0.0..=problem.pv_forecast_kw[t]))
        .collect();
    let pv_set_idx = block(&mut lp, &pv_set);

    let batt_ch: Vec<Col> = (0..t_len)
        .map(|_| lp.add_column(0.0, 0.0..=bess.p_charge_max_kw))
        .collect();
    let batt_ch_idx = block(&mut lp, &batt_ch);

    let batt_dis: Vec<Col> = (0..t_len)
        .map(|_| lp.add_column(0.0, 0.0..=bess.p_discharge_max_kw))
        .collect();
    let batt_dis_idx = block(&mut lp, &batt_dis);

    let grid_imp: Vec<Col> = (0..t_len)
        .map(|t| {
            lp.add_column(
                weights.cost * problem.tariff_buy[t] * dt,
                0.0..=limits.grid_import_max_kw,
            )
        })
        .collect();
    let grid_imp_idx = block(&mut lp, &grid_imp);

    let grid_exp: Vec<Col> = (0..t_len)
        .map(|t| {
            lp.add_column(
                -weights.cost * problem.tariff_sell[t] * dt,
                0.0..=limits.grid_export_max_kw,
            )
        })
        .collect();
    let grid_exp_idx = block(&mut lp, &grid_exp);

    let curtail: Vec<Col> = (0..t_len)
        .map(|t| lp.add_column(weights.curtail * dt, 0.0..=problem.pv_forecast_kw[t]))
        .collect();
    let curtail_idx = block(&mut lp, &curtail);

    // soc[0] is pinned to the initial state; the rest range over the band.
    let soc: Vec<Col> = (0..=t_len)
        .map(|t| {
            if t == 0 {
                lp.add_column(0.0, bess.soc0..=bess.soc0)
            } else {
                lp.add_column(0.0, bess.soc_min..=bess.soc_max)
            }
        })
        .collect();
    let soc_idx = block(&mut lp, &soc);

    let b_charge: Vec<Col> = (0..t_len)
        .map(|_| lp.add_integer_column(0.0, 0.0..=1.0))
        .collect();
    let b_import: Vec<Col> = (0..t_len)
        .map(|_| lp.add_integer_column(0.0, 0.0..=1.0))
        .collect();

    let slack_transformer = lp.add_column(weights.violation, 0.0..);

    for t in 0..t_len {
        // Power balance: pv_set + batt_dis + grid_imp = load + batt_ch + grid_exp
        lp.add_row(
            problem.load_kw[t]..=problem.load_kw[t],
            [
                (pv_set[t], 1.0),
                (batt_dis[t], 1.0),
                (grid_imp[t], 1.0),
                (batt_ch[t], -1.0),
                (grid_exp[t], -1.0),
            ],
        );

        // PV decomposition: pv_set + curtail = pv_forecast
        lp.add_row(
            problem.pv_forecast_kw[t]..=problem.pv_forecast_kw[t],
            [(pv_set[t], 1.0), (curtail[t], 1.0)],
        );

        // SOC dynamics:
        // soc[t+1] = soc[t] + (eta_ch * batt_ch - batt_dis / eta_dis) * dt / capacity
        lp.add_row(
            0.0..=0.0,
            [
                (soc[t + 1], 1.0),
                (soc[t], -1.0),
                (batt_ch[t], -bess.eta_charge * dt / bess.capacity_kwh),
                (batt_dis[t], dt / (bess.eta_discharge * bess.capacity_kwh)),
            ],
        );

        // Charge/discharge mutual exclusivity via the charge indicator.
        lp.add_row(..=0.0, [(batt_ch[t], 1.0), (b_charge[t], -BIG_M)]);
        lp.add_row(..=BIG_M, [(batt_dis[t], 1.0), (b_charge[t], BIG_M)]);

        // Import/export mutual exclusivity via the import indicator.
        lp.add_row(..=0.0, [(grid_imp[t], 1.0), (b_import[t], -BIG_M)]);
        lp.add_row(..=BIG_M, [(grid_exp[t], 1.0), (b_import[t], BIG_M)]);

        // Transformer soft limit, shared slack across the horizon.
        lp.add_row(
            ..=limits.transformer_max_kw,
            [
                (grid_imp[t], 1.0),
                (grid_exp[t], 1.0),
                (slack_transformer, -1.0),
            ],
        );
    }

    let blocks = VariableBlocks {
        pv_set: pv_set_idx,
        batt_ch: batt_ch_idx,
        batt_dis: batt_dis_idx,
        grid_imp: grid_imp_idx,
        grid_exp: grid_exp_idx,
        curtail: curtail_idx,
        soc: soc_idx,
    };
    (lp, blocks)
}

impl MilpBackend for MilpOptimizer {
    fn build_and_solve(
        &self,
        problem: &DispatchProblem,
        deadline: Duration,
    ) -> Result<Solution, SolverFailureKind> {
        let (lp, blocks) = build_model(problem);

        let mut model = lp.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        model.set_option("time_limit", deadline.as_secs_f64());
        model.set_option("mip_rel_gap", self.mip_rel_gap);
        model.set_option("threads", self.threads as i32);

        let solved = model
            .try_solve()
            .map_err(|status| SolverFailureKind::SolverError(format!("{status:?}")))?;

        match solved.status() {
            HighsModelStatus::Optimal => {}
            HighsModelStatus::ReachedTimeLimit => return Err(SolverFailureKind::Timeout),
            HighsModelStatus::Infeasible => return Err(SolverFailureKind::Infeasible),
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                return Err(SolverFailureKind::Unbounded)
            }
            other => return Err(SolverFailureKind::SolverError(format!("{other:?}"))),
        }

        let objective_value = solved.objective_value();
        let values = solved.get_solution();
        let values = values.columns();

        let extract = |range: &Range<usize>| -> Vec<f64> {
            values[range.clone()]
                .iter()
                .map(|v| if v.abs() < EXTRACT_EPS { 0.0 } else { *v })
                .collect()
        };

        let pv_set_kw = extract(&blocks.pv_set);
        let batt_ch_kw = extract(&blocks.batt_ch);
        let batt_dis_kw = extract(&blocks.batt_dis);
        let grid_imp_kw = extract(&blocks.grid_imp);
        let grid_exp_kw = extract(&blocks.grid_exp);
        let curtail_kw = extract(&blocks.curtail);
        let soc = values[blocks.soc.clone()].to_vec();

        let active_constraints = detect_active_constraints(
            problem,
            &batt_ch_kw,
            &batt_dis_kw,
            &grid_imp_kw,
            &grid_exp_kw,
            &soc,
        );

        debug!(
            site_id = %problem.site_id,
            objective_value,
            t_len = problem.t_len(),
            "milp solve accepted"
        );

        Ok(Solution {
            pv_set_kw,
            batt_ch_kw,
            batt_dis_kw,
            grid_imp_kw,
            grid_exp_kw,
            curtail_kw,
            soc,
            solver_kind: SolverKind::Milp,
            objective_value: Some(objective_value),
            active_constraints,
        })
    }
}

/// Scan the accepted solution for binding variable bounds per step.
///
/// SOC is compared at end-of-step with an absolute tolerance; power limits
/// with a ratio tolerance. A zero power limit counts as binding, since the
/// variable is genuinely pinned there.
fn detect_active_constraints(
    problem: &DispatchProblem,
    batt_ch_kw: &[f64],
    batt_dis_kw: &[f64],
    grid_imp_kw: &[f64],
    grid_exp_kw: &[f64],
    soc: &[f64],
) -> Vec<Vec<ConstraintTag>> {
    let bess = &problem.bess;
    let limits = &problem.limits;

    let at_power_bound = |value: f64, limit: f64| {
        if limit <= 0.0 {
            true
        } else {
            value >= limit * (1.0 - ACTIVE_SET_TOL)
        }
    };

    (0..problem.t_len())
        .map(|t| {
            let soc_end = soc[t + 1];
            let mut tags = Vec::new();
            if (soc_end - bess.soc_min).abs() <= ACTIVE_SET_TOL {
                tags.push(ConstraintTag::SocMin);
            }
            if (soc_end - bess.soc_max).abs() <= ACTIVE_SET_TOL {
                tags.push(ConstraintTag::SocMax);
            }
            if at_power_bound(batt_ch_kw[t], bess.p_charge_max_kw) {
                tags.push(ConstraintTag::PChargeMax);
            }
            if at_power_bound(batt_dis_kw[t], bess.p_discharge_max_kw) {
                tags.push(ConstraintTag::PDischargeMax);
            }
            if at_power_bound(grid_imp_kw[t], limits.grid_import_max_kw) {
                tags.push(ConstraintTag::GridImportMax);
            }
            if at_power_bound(grid_exp_kw[t], limits.grid_export_max_kw) {
                tags.push(ConstraintTag::GridExportMax);
            }
            tags
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BessParams, GridLimits, ObjectiveWeights};
    use crate::optimizer::validate;

    const DEADLINE: Duration = Duration::from_secs(10);

    /// Optimizer with no gap slack, for tests asserting exact values.
    fn exact() -> MilpOptimizer {
        MilpOptimizer {
            mip_rel_gap: 0.0,
            threads: 1,
        }
    }

    fn problem(
        pv: Vec<f64>,
        load: Vec<f64>,
        buy: Vec<f64>,
        sell: Vec<f64>,
        dt_hours: f64,
    ) -> DispatchProblem {
        DispatchProblem {
            site_id: "site-1".into(),
            dt_hours,
            pv_forecast_kw: pv,
            load_kw: load,
            tariff_buy: buy,
            tariff_sell: sell,
            bess: BessParams::default(),
            limits: GridLimits::default(),
            weights: ObjectiveWeights::default(),
        }
    }

    #[test]
    fn solves_basic_horizon_feasibly() {
        let p = problem(
            vec![0.0, 40.0, 80.0, 10.0],
            vec![30.0, 25.0, 20.0, 35.0],
            vec![0.2, 0.3, 0.3, 0.9],
            vec![0.1; 4],
            0.25,
        );
        let solution = MilpOptimizer::default()
            .build_and_solve(&p, DEADLINE)
            .unwrap();

        assert_eq!(solution.solver_kind, SolverKind::Milp);
        assert!(solution.objective_value.unwrap().is_finite());
        assert_eq!(solution.soc.len(), 5);
        let violations = validate::check(&p, &solution);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn single_step_horizon_solves() {
        let p = problem(vec![5.0], vec![12.0], vec![0.4], vec![0.1], 0.25);
        let solution = MilpOptimizer::default()
            .build_and_solve(&p, DEADLINE)
            .unwrap();
        assert!(validate::check(&p, &solution).is_empty());
        assert_eq!(solution.t_len(), 1);
    }

    #[test]
    fn pinned_soc_band_keeps_battery_inert() {
        let mut p = problem(
            vec![0.0; 4],
            vec![15.0; 4],
            vec![0.2, 0.9, 0.2, 0.9],
            vec![0.1; 4],
            0.25,
        );
        p.bess.soc0 = 0.5;
        p.bess.soc_min = 0.5;
        p.bess.soc_max = 0.5;
        let solution = exact().build_and_solve(&p, DEADLINE).unwrap();
        for t in 0..4 {
            assert!(solution.batt_ch_kw[t].abs() < 1e-6);
            assert!(solution.batt_dis_kw[t].abs() < 1e-6);
        }
    }

    #[test]
    fn closed_grid_with_inert_battery_is_infeasible() {
        let mut p = problem(vec![0.0; 2], vec![10.0; 2], vec![0.3; 2], vec![0.1; 2], 0.25);
        p.limits.grid_import_max_kw = 0.0;
        p.limits.grid_export_max_kw = 0.0;
        p.bess.soc_min = 0.5;
        p.bess.soc_max = 0.5;
        let err = MilpOptimizer::default()
            .build_and_solve(&p, DEADLINE)
            .unwrap_err();
        assert_eq!(err, SolverFailureKind::Infeasible);
    }

    #[test]
    fn charge_power_bound_is_reported_active() {
        // Surplus PV, no export allowed: charging at full power avoids the
        // curtailment penalty until the battery fills.
        let mut p = problem(
            vec![100.0, 100.0],
            vec![0.0, 0.0],
            vec![0.3, 0.3],
            vec![0.0, 0.0],
            0.25,
        );
        p.limits.grid_export_max_kw = 0.0;
        p.bess.p_charge_max_kw = 10.0;
        p.bess.soc0 = 0.2;
        let solution = exact().build_and_solve(&p, DEADLINE).unwrap();
        for t in 0..2 {
            assert!((solution.batt_ch_kw[t] - 10.0).abs() < 1e-4);
            assert!(
                solution.active_constraints[t].contains(&ConstraintTag::PChargeMax),
                "step {t}: {:?}",
                solution.active_constraints[t]
            );
        }
    }

    #[test]
    fn doubling_buy_tariff_never_increases_import() {
        let p = problem(
            vec![0.0, 60.0, 90.0, 0.0],
            vec![30.0, 25.0, 20.0, 35.0],
            vec![0.2, 0.3, 0.3, 0.9],
            vec![0.1; 4],
            0.25,
        );
        let base = exact().build_and_solve(&p, DEADLINE).unwrap();

        let mut doubled = p.clone();
        for v in &mut doubled.tariff_buy {
            *v *= 2.0;
        }
        let pricier = exact().build_and_solve(&doubled, DEADLINE).unwrap();

        let import_kwh = |s: &Solution| s.grid_imp_kw.iter().sum::<f64>() * p.dt_hours;
        assert!(import_kwh(&pricier) <= import_kwh(&base) + 1e-6);
    }

    #[test]
    fn tiny_deadline_reports_timeout() {
        // A horizon large enough that the solver cannot even finish its root
        // relaxation inside the limit.
        let t_len = 480;
        let pv: Vec<f64> = (0..t_len)
            .map(|t| (100.0 * ((t % 96) as f64 / 96.0 * std::f64::consts::PI).sin()).max(0.0))
            .collect();
        let load: Vec<f64> = (0..t_len).map(|t| 40.0 + (t % 17) as f64 * 3.0).collect();
        let buy: Vec<f64> = (0..t_len).map(|t| 0.2 + (t % 13) as f64 * 0.05).collect();
        let sell = vec![0.1; t_len];
        let p = problem(pv, load, buy, sell, 0.25);
        let err = MilpOptimizer::default()
            .build_and_solve(&p, Duration::from_micros(100))
            .unwrap_err();
        assert_eq!(err, SolverFailureKind::Timeout);
    }
}
