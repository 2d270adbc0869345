use serde::{Deserialize, Serialize};

/// Battery energy storage system parameters.
///
/// SOC values are fractions of usable capacity in `[0, 1]`; efficiencies are
/// one-way (charge and discharge applied separately, not round-trip).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BessParams {
    pub capacity_kwh: f64,
    pub p_charge_max_kw: f64,
    pub p_discharge_max_kw: f64,
    pub soc0: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub eta_charge: f64,
    pub eta_discharge: f64,
}

impl Default for BessParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 100.0,
            p_charge_max_kw: 50.0,
            p_discharge_max_kw: 50.0,
            soc0: 0.5,
            soc_min: 0.2,
            soc_max: 0.9,
            eta_charge: 0.95,
            eta_discharge: 0.95,
        }
    }
}

/// Grid connection and transformer limits in kW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridLimits {
    pub grid_import_max_kw: f64,
    pub grid_export_max_kw: f64,
    pub transformer_max_kw: f64,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self {
            grid_import_max_kw: 200.0,
            grid_export_max_kw: 200.0,
            transformer_max_kw: 250.0,
        }
    }
}

/// Weights of the three objective terms: monetary cost, curtailed energy,
/// transformer-limit violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObjectiveWeights {
    pub cost: f64,
    pub curtail: f64,
    pub violation: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: 1.0,
            curtail: 0.2,
            violation: 1000.0,
        }
    }
}

/// A fully validated dispatch problem over a contiguous horizon of `t_len`
/// evenly spaced steps of `dt_hours` each.
///
/// Built once per request by [`crate::input::normalize`] and treated as
/// immutable afterwards: both solvers, the explainer and the KPI calculator
/// read from the same instance. All arrays have length `t_len`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchProblem {
    pub site_id: String,
    pub dt_hours: f64,
    pub pv_forecast_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    pub tariff_buy: Vec<f64>,
    pub tariff_sell: Vec<f64>,
    pub bess: BessParams,
    pub limits: GridLimits,
    pub weights: ObjectiveWeights,
}

impl DispatchProblem {
    /// Number of timesteps in the horizon.
    pub fn t_len(&self) -> usize {
        self.load_kw.len()
    }
}
