//! Constraint-based timetable scheduler on a CP-SAT-class 0/1 back-end.
//!
//! `CpScheduler` is the solve driver: it audits the model, builds the 0/1
//! encoding, runs single-pass or adaptive two-pass solves, decodes the
//! result (including the room post-pass), re-validates it independently and
//! maps back-end verdicts onto the stable status set. The diagnostic
//! relaxer and the incremental re-solve live here as well.

mod decode;
mod driver;
mod model;
mod relax;

pub use relax::{RelaxReport, RelaxResult};

use driver::{solve_assignment, solve_full, BackendConfig, SolveOutcome};
use model::BuildOptions;
use plan_core::{
    audit, validate_model, ProgressStats, SchedError, SolutionValidator, SolveContext, Solver,
};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Instant;
use types::{
    ClassId, ConfigSnapshot, DomainModel, ScheduleEntry, SoftWeights, Solution, SolveStatus,
    TeacherId,
};

/// Number of classes from which the two-pass strategy switches on.
const TWO_PASS_THRESHOLD: usize = 20;
/// Time limit per relaxation probe, in seconds.
const RELAX_PROBE_SECONDS: f64 = 30.0;

// One solve session at a time per process; independent models queue up
// behind this instead of interleaving back-end sessions.
static SESSION: Mutex<()> = Mutex::new(());

/// Entities whose placements may move in an incremental re-solve.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub teachers: BTreeSet<TeacherId>,
    pub classes: BTreeSet<ClassId>,
}

#[derive(Default)]
pub struct CpScheduler;

impl CpScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Runs the relaxation diagnosis on its own: probe the model, then
    /// strip constraint families until one restores feasibility.
    pub fn diagnose(
        &self,
        model: &DomainModel,
        ctx: &SolveContext<'_>,
    ) -> Result<RelaxReport, SchedError> {
        let _session = lock_session();
        validate_model(model)?;
        let cfg = backend_config(model, RELAX_PROBE_SECONDS);
        let probe = solve_full(
            model,
            &BuildOptions {
                use_soft: false,
                ..BuildOptions::default()
            },
            &SoftWeights::zero(),
            &cfg,
        );
        Ok(relax::run_diagnosis(
            model,
            probe.status,
            &cfg,
            RELAX_PROBE_SECONDS,
            &ctx.cancel,
        ))
    }

    /// Re-solve after a small change: placements of unaffected
    /// (teacher, class, subject) triples stay where they were. If that is
    /// infeasible, fixed classes are released one by one.
    pub fn resolve_incremental(
        &self,
        model: &DomainModel,
        previous: &Solution,
        changes: &ChangeSet,
        ctx: &SolveContext<'_>,
    ) -> Result<Solution, SchedError> {
        let _session = lock_session();
        validate_model(model)?;
        let report = audit(model);
        if !report.feasible {
            return Err(SchedError::InfeasibleStatic(report));
        }

        let t_start = Instant::now();
        let time_limit = effective_time_limit(model, ctx);
        let weights = effective_weights(model, ctx);
        let use_soft = !ctx.options.no_soft;

        let mut fixed: Vec<ScheduleEntry> = previous
            .entries
            .iter()
            .filter(|e| {
                e.coupling.is_none()
                    && !changes.teachers.contains(&e.teacher)
                    && !changes.classes.contains(&e.class)
            })
            .cloned()
            .collect();
        tracing::info!(fixed = fixed.len(), "incremental re-solve");

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(SchedError::Cancelled { incumbent: None });
            }
            let remaining = time_limit - t_start.elapsed().as_secs_f64();
            if remaining <= 0.0 {
                return Err(SchedError::Timeout);
            }
            let opts = BuildOptions {
                use_soft,
                fixed_entries: fixed.clone(),
                ..BuildOptions::default()
            };
            let cfg = backend_config(model, remaining);
            let outcome = solve_full(model, &opts, &weights, &cfg);
            emit_progress(ctx, "incremental", t_start, &outcome);

            match outcome.status {
                SolveStatus::Infeasible if !fixed.is_empty() => {
                    // Release the placements of one more class and retry.
                    let victim = fixed
                        .iter()
                        .map(|e| e.class.clone())
                        .min()
                        .expect("fixed entries non-empty");
                    tracing::warn!(class = %victim, "releasing fixed placements");
                    fixed.retain(|e| e.class != victim);
                }
                _ => {
                    return finish(
                        model, ctx, outcome, t_start, &weights, use_soft, false, time_limit,
                    )
                }
            }
        }
    }
}

impl Solver for CpScheduler {
    fn solve(&self, model: &DomainModel, ctx: &SolveContext<'_>) -> Result<Solution, SchedError> {
        let _session = lock_session();
        validate_model(model)?;

        let report = audit(model);
        for warning in &report.warnings {
            tracing::warn!(audit = %warning);
        }
        if !report.feasible {
            for error in &report.errors {
                tracing::error!(audit = %error);
            }
            return Err(SchedError::InfeasibleStatic(report));
        }

        let t_start = Instant::now();
        let time_limit = effective_time_limit(model, ctx);
        let weights = effective_weights(model, ctx);
        let use_soft = !ctx.options.no_soft;
        let two_pass = ctx
            .options
            .two_pass
            .unwrap_or(model.classes.len() >= TWO_PASS_THRESHOLD);
        tracing::info!(
            classes = model.classes.len(),
            teachers = model.teachers.len(),
            two_pass,
            time_limit,
            "starting solve"
        );

        if ctx.cancel.is_cancelled() {
            return Err(SchedError::Cancelled { incumbent: None });
        }

        let outcome = if two_pass {
            self.run_two_pass(model, ctx, &weights, use_soft, time_limit, t_start)?
        } else {
            let cfg = backend_config(model, time_limit);
            let opts = BuildOptions {
                use_soft,
                ..BuildOptions::default()
            };
            let outcome = solve_full(model, &opts, &weights, &cfg);
            emit_progress(ctx, "solve", t_start, &outcome);
            outcome
        };

        finish(model, ctx, outcome, t_start, &weights, use_soft, two_pass, time_limit)
    }
}

impl CpScheduler {
    fn run_two_pass(
        &self,
        model: &DomainModel,
        ctx: &SolveContext<'_>,
        weights: &SoftWeights,
        use_soft: bool,
        time_limit: f64,
        t_start: Instant,
    ) -> Result<SolveOutcome, SchedError> {
        let pass1_cfg = backend_config(model, time_limit / 2.0);
        let opts = BuildOptions {
            use_soft,
            ..BuildOptions::default()
        };
        let (status, plan, pass1_elapsed) = solve_assignment(model, &opts, weights, &pass1_cfg);
        if let Some(sink) = ctx.progress {
            sink.on_progress(&ProgressStats {
                phase: "pass1",
                wall_time_seconds: t_start.elapsed().as_secs_f64(),
                best_objective: None,
                solutions_found: status.is_solution() as u32,
                num_variables: 0,
                num_constraints: 0,
            });
        }

        match (status, plan) {
            (status, Some(plan)) if status.is_solution() => {
                if ctx.cancel.is_cancelled() {
                    return Err(SchedError::Cancelled { incumbent: None });
                }
                // Pass 2 reclaims whatever pass 1 left on the table.
                let remaining = (time_limit - pass1_elapsed).max(time_limit / 10.0);
                let opts2 = BuildOptions {
                    use_soft,
                    fix_assignments: Some(plan),
                    ..BuildOptions::default()
                };
                let cfg2 = backend_config(model, remaining);
                let outcome = solve_full(model, &opts2, weights, &cfg2);
                emit_progress(ctx, "pass2", t_start, &outcome);
                Ok(outcome)
            }
            (SolveStatus::Infeasible, _) => Ok(SolveOutcome {
                status: SolveStatus::Infeasible,
                entries: Vec::new(),
                assignments: Vec::new(),
                objective: None,
                num_variables: 0,
                num_constraints: 0,
                elapsed: pass1_elapsed,
            }),
            _ => {
                tracing::warn!("assignment pass gave no verdict; falling back to a single pass");
                let remaining = (time_limit - pass1_elapsed).max(time_limit / 10.0);
                let cfg = backend_config(model, remaining);
                let outcome = solve_full(model, &opts, weights, &cfg);
                emit_progress(ctx, "solve", t_start, &outcome);
                Ok(outcome)
            }
        }
    }
}

fn lock_session() -> std::sync::MutexGuard<'static, ()> {
    SESSION.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn effective_time_limit(model: &DomainModel, ctx: &SolveContext<'_>) -> f64 {
    ctx.options
        .time_limit_override
        .unwrap_or(model.limits.time_limit_seconds) as f64
}

fn effective_weights(model: &DomainModel, ctx: &SolveContext<'_>) -> SoftWeights {
    if ctx.options.no_soft {
        SoftWeights::zero()
    } else {
        model.weights.clone()
    }
}

fn backend_config(model: &DomainModel, time_limit: f64) -> BackendConfig {
    let threads = if model.limits.num_workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4)
    } else {
        model.limits.num_workers as i32
    };
    BackendConfig {
        time_limit: time_limit.max(1.0),
        threads,
        seed: model.limits.seed as i32,
    }
}

fn emit_progress(ctx: &SolveContext<'_>, phase: &'static str, t_start: Instant, o: &SolveOutcome) {
    if let Some(sink) = ctx.progress {
        sink.on_progress(&ProgressStats {
            phase,
            wall_time_seconds: t_start.elapsed().as_secs_f64(),
            best_objective: o.objective,
            solutions_found: o.status.is_solution() as u32,
            num_variables: o.num_variables,
            num_constraints: o.num_constraints,
        });
    }
}

/// Common tail of every solve path: map the status, run the room
/// post-pass, snapshot the configuration, and re-validate independently.
#[allow(clippy::too_many_arguments)]
fn finish(
    model: &DomainModel,
    ctx: &SolveContext<'_>,
    outcome: SolveOutcome,
    t_start: Instant,
    weights: &SoftWeights,
    use_soft: bool,
    two_pass: bool,
    time_limit: f64,
) -> Result<Solution, SchedError> {
    match outcome.status {
        SolveStatus::Infeasible => {
            let hint = if ctx.options.diagnose {
                let cfg = backend_config(model, time_limit);
                let report = relax::run_diagnosis(
                    model,
                    SolveStatus::Infeasible,
                    &cfg,
                    RELAX_PROBE_SECONDS,
                    &ctx.cancel,
                );
                tracing::info!(
                    offender = ?report.first_feasible,
                    "relaxation diagnosis finished"
                );
                Some(report.recommendation)
            } else {
                None
            };
            Err(SchedError::InfeasibleSolve { hint })
        }
        SolveStatus::Unknown => Err(SchedError::Timeout),
        SolveStatus::Cancelled => Err(SchedError::Cancelled { incumbent: None }),
        SolveStatus::Optimal | SolveStatus::Feasible => {
            let mut entries = outcome.entries;
            let slots = plan_core::SlotIndex::new(&model.time_grid);
            decode::assign_rooms(model, &slots, &mut entries)?;

            let solution = Solution {
                status: outcome.status,
                entries,
                assignments: outcome.assignments,
                objective_value: outcome.objective,
                num_variables: outcome.num_variables,
                num_constraints: outcome.num_constraints,
                solve_time_seconds: t_start.elapsed().as_secs_f64(),
                config_snapshot: ConfigSnapshot {
                    time_limit_seconds: time_limit as u32,
                    num_workers: model.limits.num_workers,
                    seed: model.limits.seed,
                    use_soft,
                    two_pass,
                    weights: weights.clone(),
                },
            };

            let check = SolutionValidator::new().validate(&solution, model);
            if !check.is_valid() {
                for violation in check.errors() {
                    tracing::error!(
                        constraint = violation.constraint,
                        entity = %violation.entity,
                        detail = %violation.description,
                        "decoded solution violates an invariant"
                    );
                }
                return Err(SchedError::Internal(format!(
                    "validator rejected the decoded solution ({} errors)",
                    check.errors().count()
                )));
            }

            if let Some(sink) = ctx.progress {
                sink.on_solution(&solution);
            }
            tracing::info!(
                status = ?solution.status,
                entries = solution.entries.len(),
                objective = ?solution.objective_value,
                time = solution.solve_time_seconds,
                "solve finished"
            );
            Ok(solution)
        }
    }
}
