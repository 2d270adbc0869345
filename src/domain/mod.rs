pub mod problem;
pub mod request;
pub mod solution;

pub use problem::{BessParams, DispatchProblem, GridLimits, ObjectiveWeights};
pub use request::{
    DispatchRequest, DispatchResult, DispatchStatus, SchedulePoint, SolverLabel, TariffSchedule,
};
pub use solution::{ConstraintTag, Solution, SolverKind};
