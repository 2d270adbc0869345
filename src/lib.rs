//! Deterministic day-ahead dispatch engine for a site combining PV
//! generation, battery storage, local load and a grid connection.
//!
//! Given forecasts, tariffs and asset limits, [`service::DispatchService`]
//! computes a power schedule over a discrete horizon that minimizes weighted
//! energy cost, curtailment and constraint violation. The schedule comes
//! from a mixed-integer model solved under a hard wall-clock deadline; if
//! the solver cannot deliver, a deterministic rule-based scheduler
//! guarantees a feasible result. Each step carries a human-readable reason,
//! and aggregate KPIs are computed with the same arithmetic the solvers use.
//!
//! The HTTP surface, forecast retrieval and persistence live outside this
//! crate and plug in through [`forecast::ForecastProvider`] and
//! [`persist::RunStore`].

pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod input;
pub mod optimizer;
pub mod persist;
pub mod service;
pub mod telemetry;

pub use config::CoreConfig;
pub use domain::{
    DispatchProblem, DispatchRequest, DispatchResult, DispatchStatus, SchedulePoint, Solution,
    SolverKind, SolverLabel,
};
pub use error::{DispatchError, SolverFailureKind};
pub use service::DispatchService;
