use thiserror::Error;

/// Why the MILP solve did not yield a usable solution.
///
/// Every variant triggers the rule-based fallback; the variant name is
/// surfaced in the result's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverFailureKind {
    #[error("timeout")]
    Timeout,
    #[error("infeasible")]
    Infeasible,
    #[error("unbounded")]
    Unbounded,
    #[error("solver_error: {0}")]
    SolverError(String),
}

/// Typed outcomes of a dispatch run that prevent or degrade solving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Schema, length or range violation in the request. `field` names the
    /// first failing field in declaration order (e.g. `tariff.buy`).
    #[error("{field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// The forecast collaborator returned no usable PV data.
    #[error("pv_forecast_unavailable")]
    ForecastUnavailable,

    /// The MILP solver terminated without a solution; recovered locally by
    /// the fallback scheduler.
    #[error(transparent)]
    SolverFailure(#[from] SolverFailureKind),
}

impl DispatchError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
