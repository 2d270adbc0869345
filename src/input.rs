//! Request validation and normalization.
//!
//! Turns a [`DispatchRequest`] plus a resolved PV forecast into an immutable
//! [`DispatchProblem`], or rejects it with an [`DispatchError::InvalidInput`]
//! naming the first failing field in declaration order.

use crate::domain::{BessParams, DispatchProblem, DispatchRequest, GridLimits, ObjectiveWeights};
use crate::error::DispatchError;

/// Longest supported horizon (e.g. six days at 15-minute resolution).
pub const MAX_TIMESTEPS: usize = 576;

/// Validate `request` and the PV forecast resolved for it, applying defaults
/// for absent parameter blocks.
pub fn normalize(
    request: &DispatchRequest,
    pv_forecast_kw: Vec<f64>,
) -> Result<DispatchProblem, DispatchError> {
    if request.resolution_minutes == 0 {
        return Err(DispatchError::invalid_input(
            "resolution_minutes",
            "must be a positive integer",
        ));
    }

    let t_len = request.load_kw.len();
    if t_len == 0 {
        return Err(DispatchError::invalid_input("load_kw", "must not be empty"));
    }
    if t_len > MAX_TIMESTEPS {
        return Err(DispatchError::invalid_input(
            "load_kw",
            format!("horizon of {t_len} steps exceeds the supported maximum of {MAX_TIMESTEPS}"),
        ));
    }

    check_series("load_kw", &request.load_kw, t_len)?;
    check_series("tariff.buy", &request.tariff.buy, t_len)?;
    check_series("tariff.sell", &request.tariff.sell, t_len)?;
    check_series("pv_forecast_kw", &pv_forecast_kw, t_len)?;

    if !(0.0..=1.0).contains(&request.forecast_quantile) {
        return Err(DispatchError::invalid_input(
            "forecast_quantile",
            "must lie in [0, 1]",
        ));
    }

    let bess = request.bess.clone().unwrap_or_default();
    check_bess(&bess)?;

    let limits = request.limits.clone().unwrap_or_default();
    check_limit("limits.grid_import_max_kw", limits.grid_import_max_kw)?;
    check_limit("limits.grid_export_max_kw", limits.grid_export_max_kw)?;
    check_limit("limits.transformer_max_kw", limits.transformer_max_kw)?;

    let weights = request.weights.clone().unwrap_or_default();
    check_limit("weights.cost", weights.cost)?;
    check_limit("weights.curtail", weights.curtail)?;
    check_limit("weights.violation", weights.violation)?;

    if let Some(timeout_ms) = request.solver_timeout_ms {
        if timeout_ms == 0 {
            return Err(DispatchError::invalid_input(
                "solver_timeout_ms",
                "must be a positive integer",
            ));
        }
    }

    Ok(DispatchProblem {
        site_id: request.site_id.clone(),
        dt_hours: f64::from(request.resolution_minutes) / 60.0,
        pv_forecast_kw,
        load_kw: request.load_kw.clone(),
        tariff_buy: request.tariff.buy.clone(),
        tariff_sell: request.tariff.sell.clone(),
        bess,
        limits,
        weights,
    })
}

fn check_series(field: &str, values: &[f64], t_len: usize) -> Result<(), DispatchError> {
    if values.len() != t_len {
        return Err(DispatchError::invalid_input(
            field,
            format!("expected length {t_len}, got {}", values.len()),
        ));
    }
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(DispatchError::invalid_input(
                field,
                format!("value at index {i} is not finite"),
            ));
        }
        if *v < 0.0 {
            return Err(DispatchError::invalid_input(
                field,
                format!("value {v} at index {i} is negative"),
            ));
        }
    }
    Ok(())
}

fn check_limit(field: &str, value: f64) -> Result<(), DispatchError> {
    if !value.is_finite() {
        return Err(DispatchError::invalid_input(field, "must be finite"));
    }
    if value < 0.0 {
        return Err(DispatchError::invalid_input(field, "must be non-negative"));
    }
    Ok(())
}

fn check_fraction(field: &str, value: f64) -> Result<(), DispatchError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DispatchError::invalid_input(field, "must lie in [0, 1]"));
    }
    Ok(())
}

fn check_bess(bess: &BessParams) -> Result<(), DispatchError> {
    if !bess.capacity_kwh.is_finite() || bess.capacity_kwh <= 0.0 {
        return Err(DispatchError::invalid_input(
            "bess.capacity_kwh",
            "must be positive",
        ));
    }
    check_limit("bess.p_charge_max_kw", bess.p_charge_max_kw)?;
    check_limit("bess.p_discharge_max_kw", bess.p_discharge_max_kw)?;
    check_fraction("bess.soc0", bess.soc0)?;
    check_fraction("bess.soc_min", bess.soc_min)?;
    check_fraction("bess.soc_max", bess.soc_max)?;
    if bess.soc_min > bess.soc_max {
        return Err(DispatchError::invalid_input(
            "bess.soc_min",
            format!(
                "soc_min {} exceeds soc_max {}",
                bess.soc_min, bess.soc_max
            ),
        ));
    }
    if bess.soc0 < bess.soc_min || bess.soc0 > bess.soc_max {
        return Err(DispatchError::invalid_input(
            "bess.soc0",
            format!(
                "soc0 {} outside [{}, {}]",
                bess.soc0, bess.soc_min, bess.soc_max
            ),
        ));
    }
    check_efficiency("bess.eta_charge", bess.eta_charge)?;
    check_efficiency("bess.eta_discharge", bess.eta_discharge)?;
    Ok(())
}

fn check_efficiency(field: &str, value: f64) -> Result<(), DispatchError> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(DispatchError::invalid_input(field, "must lie in (0, 1]"));
    }
    Ok(())
}
