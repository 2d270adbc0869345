//! Request-scoped dispatch orchestration.
//!
//! One [`DispatchService::solve`] call runs a linear pipeline: resolve the
//! PV forecast, normalize the request, solve (MILP under a wall-clock
//! deadline, falling back to the rule scheduler on any solver failure),
//! derive explanations and KPIs, persist best-effort, and return the result.
//! No state is shared between requests; every solve builds its own solver
//! model, so concurrent requests are independent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::domain::{
    DispatchProblem, DispatchRequest, DispatchResult, DispatchStatus, SchedulePoint, Solution,
    SolverLabel,
};
use crate::error::{DispatchError, SolverFailureKind};
use crate::forecast::ForecastProvider;
use crate::input::normalize;
use crate::optimizer::fallback::RuleBasedScheduler;
use crate::optimizer::kpi::{self, Kpis};
use crate::optimizer::milp::MilpOptimizer;
use crate::optimizer::validate::{self, POWER_TOLERANCE_KW};
use crate::optimizer::{explain, MilpBackend};
use crate::persist::{RunMetadata, RunStore};

/// Extra wall-clock allowance beyond the solver's own time limit before the
/// solve is abandoned from outside. The in-solver limit is the primary stop
/// signal; this bound only catches a hung backend.
const SOLVER_DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// The dispatch core's entry point, generic over its two collaborators.
pub struct DispatchService<F, S> {
    forecast: F,
    store: S,
    milp: Arc<dyn MilpBackend>,
    config: CoreConfig,
}

impl<F, S> DispatchService<F, S>
where
    F: ForecastProvider,
    S: RunStore,
{
    pub fn new(forecast: F, store: S, config: CoreConfig) -> Self {
        let milp: Arc<dyn MilpBackend> = Arc::new(MilpOptimizer {
            mip_rel_gap: config.solver.mip_rel_gap,
            threads: config.solver.threads,
        });
        Self {
            forecast,
            store,
            milp,
            config,
        }
    }

    /// Swap the MILP backend, e.g. for a stub in tests.
    pub fn with_backend(mut self, backend: Arc<dyn MilpBackend>) -> Self {
        self.milp = backend;
        self
    }

    /// Run one dispatch request end to end. Never panics and never returns a
    /// transport error: invalid input, forecast unavailability and solver
    /// failures are all encoded in the result.
    pub async fn solve(&self, request: DispatchRequest) -> DispatchResult {
        let started = Instant::now();

        let pv_forecast_kw = match self.resolve_pv(&request).await {
            Ok(pv) => pv,
            Err(rejected) => return rejected,
        };

        let problem = match normalize(&request, pv_forecast_kw) {
            Ok(problem) => problem,
            Err(err) => {
                warn!(site_id = %request.site_id, error = %err, "dispatch request rejected");
                return DispatchResult::rejected(err.to_string());
            }
        };

        let timeout_ms = request
            .solver_timeout_ms
            .unwrap_or(self.config.solver.timeout_ms);
        let deadline = Duration::from_millis(timeout_ms);

        let mut error = None;
        let (solution, solver, fallback_used) = if request.use_milp {
            match self.run_milp(&problem, deadline).await {
                Ok(solution) => {
                    let violations = validate::check(&problem, &solution);
                    for violation in &violations {
                        warn!(site_id = %problem.site_id, %violation, "milp schedule violates invariant");
                    }
                    (solution, SolverLabel::Milp, false)
                }
                Err(kind) => {
                    warn!(
                        site_id = %problem.site_id,
                        failure = %kind,
                        "milp solve failed; using rule-based fallback"
                    );
                    error = Some(kind.to_string());
                    let outcome = RuleBasedScheduler::schedule(&problem);
                    if outcome.max_residual_kw > POWER_TOLERANCE_KW {
                        error = Some("residual_imbalance".to_string());
                    }
                    (outcome.solution, SolverLabel::FallbackRule, true)
                }
            }
        } else {
            let outcome = RuleBasedScheduler::schedule(&problem);
            if outcome.max_residual_kw > POWER_TOLERANCE_KW {
                error = Some("residual_imbalance".to_string());
            }
            (outcome.solution, SolverLabel::RuleBased, true)
        };

        let reasons = explain::explain(&problem, &solution);
        let kpis = kpi::calculate(&problem, &solution);
        let schedule = to_schedule(&solution, reasons);

        let status = if fallback_used {
            DispatchStatus::Fallback
        } else {
            DispatchStatus::Ok
        };
        let objective_value = solution.objective_value;

        self.persist(
            &problem,
            status,
            solver,
            fallback_used,
            objective_value,
            started.elapsed(),
            timeout_ms,
            &schedule,
            &kpis,
        )
        .await;

        info!(
            site_id = %problem.site_id,
            t_len = problem.t_len(),
            solver = ?solver,
            fallback_used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch run complete"
        );

        DispatchResult {
            status,
            solver: Some(solver),
            fallback_used,
            objective_value,
            schedule,
            kpis: Some(kpis),
            error,
        }
    }

    /// Use the supplied forecast or fetch one through the collaborator.
    async fn resolve_pv(&self, request: &DispatchRequest) -> Result<Vec<f64>, DispatchResult> {
        if let Some(pv) = &request.pv_forecast_kw {
            return Ok(pv.clone());
        }

        let start = request.start.unwrap_or_else(next_midnight_utc);
        let horizon_minutes =
            i64::from(request.resolution_minutes) * request.load_kw.len() as i64;
        let end = request
            .end
            .unwrap_or(start + ChronoDuration::minutes(horizon_minutes));

        match self
            .forecast
            .fetch_pv(
                &request.site_id,
                start,
                end,
                request.resolution_minutes,
                request.forecast_quantile,
            )
            .await
        {
            Ok(pv) => Ok(pv),
            Err(err) => {
                warn!(site_id = %request.site_id, error = %err, "pv forecast fetch failed");
                Err(DispatchResult::rejected(
                    DispatchError::ForecastUnavailable.to_string(),
                ))
            }
        }
    }

    /// Run the MILP backend on a blocking thread, bounded by the deadline.
    ///
    /// The deadline is handed to the backend as its own time limit; if the
    /// backend overruns it plus a small grace the solve is abandoned and
    /// reported as a timeout. Cancellation is cooperative: dropping the
    /// future stops waiting while the in-solver limit winds the thread down.
    async fn run_milp(
        &self,
        problem: &DispatchProblem,
        deadline: Duration,
    ) -> Result<Solution, SolverFailureKind> {
        let backend = Arc::clone(&self.milp);
        let problem = problem.clone();
        let handle =
            tokio::task::spawn_blocking(move || backend.build_and_solve(&problem, deadline));

        match tokio::time::timeout(deadline + SOLVER_DEADLINE_GRACE, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SolverFailureKind::SolverError(join_error.to_string())),
            Err(_elapsed) => Err(SolverFailureKind::Timeout),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        problem: &DispatchProblem,
        status: DispatchStatus,
        solver: SolverLabel,
        fallback_used: bool,
        objective_value: Option<f64>,
        elapsed: Duration,
        timeout_ms: u64,
        schedule: &[SchedulePoint],
        kpis: &Kpis,
    ) {
        let meta = RunMetadata {
            site_id: problem.site_id.clone(),
            status,
            solver,
            fallback_used,
            objective_value,
            solver_time_ms: elapsed.as_millis() as u64,
            timeout_ms,
            created_at: Utc::now(),
        };

        let run_id = match self.store.write_run(&meta).await {
            Ok(run_id) => run_id,
            Err(err) => {
                warn!(site_id = %problem.site_id, error = %err, "failed to persist run metadata");
                return;
            }
        };
        if let Err(err) = self.store.write_schedule(run_id, schedule).await {
            warn!(site_id = %problem.site_id, %run_id, error = %err, "failed to persist schedule");
        }
        if let Err(err) = self.store.write_kpis(run_id, kpis).await {
            warn!(site_id = %problem.site_id, %run_id, error = %err, "failed to persist kpis");
        }
    }
}

fn to_schedule(solution: &Solution, reasons: Vec<String>) -> Vec<SchedulePoint> {
    reasons
        .into_iter()
        .enumerate()
        .map(|(t, reason)| SchedulePoint {
            pv_set_kw: solution.pv_set_kw[t],
            batt_ch_kw: solution.batt_ch_kw[t],
            batt_dis_kw: solution.batt_dis_kw[t],
            grid_imp_kw: solution.grid_imp_kw[t],
            grid_exp_kw: solution.grid_exp_kw[t],
            curtail_kw: solution.curtail_kw[t],
            soc: solution.soc[t + 1],
            reason,
        })
        .collect()
}

/// Default forecast window start: the next UTC midnight.
fn next_midnight_utc() -> DateTime<Utc> {
    (Utc::now() + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}
