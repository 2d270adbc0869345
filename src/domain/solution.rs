use serde::{Deserialize, Serialize};
use std::fmt;

/// Which engine produced a [`Solution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Milp,
    Fallback,
}

/// A variable bound that is binding at the returned optimum.
///
/// Tags are reported per timestep by the MILP active-set scan; the fallback
/// scheduler never populates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintTag {
    SocMin,
    SocMax,
    PChargeMax,
    PDischargeMax,
    GridImportMax,
    GridExportMax,
}

impl fmt::Display for ConstraintTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintTag::SocMin => "soc_min",
            ConstraintTag::SocMax => "soc_max",
            ConstraintTag::PChargeMax => "p_charge_max",
            ConstraintTag::PDischargeMax => "p_discharge_max",
            ConstraintTag::GridImportMax => "grid_import_max",
            ConstraintTag::GridExportMax => "grid_export_max",
        };
        f.write_str(name)
    }
}

/// Power schedule for one horizon, produced by either solver.
///
/// All power arrays have length `T`; `soc` has `T + 1` entries with
/// `soc[0]` equal to the initial state of charge and `soc[T]` the terminal
/// state. `pv_set` is total utilized PV (serving load, charging and export),
/// so `pv_set[t] + curtail[t] = pv_forecast[t]` at every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub pv_set_kw: Vec<f64>,
    pub batt_ch_kw: Vec<f64>,
    pub batt_dis_kw: Vec<f64>,
    pub grid_imp_kw: Vec<f64>,
    pub grid_exp_kw: Vec<f64>,
    pub curtail_kw: Vec<f64>,
    pub soc: Vec<f64>,
    pub solver_kind: SolverKind,
    /// Objective value reported by the MILP solver; `None` for the fallback.
    pub objective_value: Option<f64>,
    /// Binding variable bounds per timestep, in declaration order of
    /// [`ConstraintTag`]. Empty sets for the fallback.
    pub active_constraints: Vec<Vec<ConstraintTag>>,
}

impl Solution {
    /// Number of timesteps covered by the schedule.
    pub fn t_len(&self) -> usize {
        self.pv_set_kw.len()
    }
}
