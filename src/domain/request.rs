use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::problem::{BessParams, GridLimits, ObjectiveWeights};
use crate::optimizer::kpi::Kpis;

/// Buy/sell tariff arrays, one value per timestep, in currency/kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TariffSchedule {
    pub buy: Vec<f64>,
    pub sell: Vec<f64>,
}

/// A dispatch request as received from the caller.
///
/// Unknown fields are rejected. Optional parameter blocks fall back to the
/// documented defaults during normalization; `pv_forecast_kw` may be omitted,
/// in which case the forecast collaborator is queried for the window
/// `[start, end)` at `forecast_quantile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchRequest {
    pub site_id: String,
    pub resolution_minutes: u32,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    pub load_kw: Vec<f64>,
    pub tariff: TariffSchedule,
    #[serde(default)]
    pub pv_forecast_kw: Option<Vec<f64>>,
    #[serde(default = "default_forecast_quantile")]
    pub forecast_quantile: f64,
    #[serde(default)]
    pub bess: Option<BessParams>,
    #[serde(default)]
    pub limits: Option<GridLimits>,
    #[serde(default)]
    pub weights: Option<ObjectiveWeights>,
    #[serde(default = "default_use_milp")]
    pub use_milp: bool,
    #[serde(default)]
    pub solver_timeout_ms: Option<u64>,
}

fn default_forecast_quantile() -> f64 {
    0.5
}

fn default_use_milp() -> bool {
    true
}

/// Overall outcome of a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Ok,
    Fallback,
    InvalidInput,
}

/// Which scheduling path produced the returned schedule.
///
/// `FallbackRule` marks a fallback forced by a MILP failure; `RuleBased`
/// marks the rule scheduler selected explicitly via `use_milp = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverLabel {
    Milp,
    FallbackRule,
    RuleBased,
}

/// One schedule row returned to the caller. `soc` is the end-of-step state
/// of charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePoint {
    pub pv_set_kw: f64,
    pub batt_ch_kw: f64,
    pub batt_dis_kw: f64,
    pub grid_imp_kw: f64,
    pub grid_exp_kw: f64,
    pub curtail_kw: f64,
    pub soc: f64,
    pub reason: String,
}

/// The complete result of [`crate::service::DispatchService::solve`].
///
/// Errors are encoded rather than raised: invalid input yields
/// `status = invalid_input` with an empty schedule, and a recovered solver
/// failure yields `status = fallback` with the failure subtype in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub solver: Option<SolverLabel>,
    pub fallback_used: bool,
    pub objective_value: Option<f64>,
    pub schedule: Vec<SchedulePoint>,
    pub kpis: Option<Kpis>,
    pub error: Option<String>,
}

impl DispatchResult {
    /// Result shell for a request rejected before any solver ran.
    pub fn rejected(error: String) -> Self {
        Self {
            status: DispatchStatus::InvalidInput,
            solver: None,
            fallback_used: false,
            objective_value: None,
            schedule: Vec::new(),
            kpis: None,
            error: Some(error),
        }
    }
}
