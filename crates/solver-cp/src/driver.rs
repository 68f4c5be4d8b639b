//! Backend invocation and pass orchestration.
//!
//! Every solve goes through `solve_full` (placement model) or
//! `solve_assignment` (pass 1 of the two-pass strategy). Status mapping is
//! centralised here: the back-end reports optimality through `Ok`,
//! infeasibility through its error channel, and everything else becomes
//! `Unknown`.

use crate::decode::extract_entries;
use crate::model::{
    build_assignment_objective, build_objective, declare_assignment_vars, declare_soft,
    declare_variables, post_assignment_constraints, post_constraints, AssignmentPlan,
    BuildOptions, Prep,
};
use good_lp::{default_solver, Expression, ProblemVariables, ResolutionError, Solution as LpSolution, SolverModel};
use std::time::Instant;
use types::{DomainModel, ScheduleEntry, SoftWeights, SolveStatus, TeacherAssignment};

#[derive(Clone, Copy, Debug)]
pub(crate) struct BackendConfig {
    pub time_limit: f64,
    pub threads: i32,
    pub seed: i32,
}

pub(crate) struct SolveOutcome {
    pub status: SolveStatus,
    pub entries: Vec<ScheduleEntry>,
    pub assignments: Vec<TeacherAssignment>,
    pub objective: Option<f64>,
    pub num_variables: usize,
    pub num_constraints: usize,
    pub elapsed: f64,
}

/// Builds and solves the full placement model.
pub(crate) fn solve_full(
    dm: &DomainModel,
    opts: &BuildOptions,
    weights: &SoftWeights,
    cfg: &BackendConfig,
) -> SolveOutcome {
    let prep = Prep::new(dm);
    let mut pvars = ProblemVariables::new();
    let vars = declare_variables(&prep, opts, &mut pvars);
    let soft = declare_soft(&prep, opts, weights, &vars, &mut pvars);
    let objective = if opts.use_soft {
        build_objective(&prep, &vars, &soft, weights)
    } else {
        Expression::from(0.0)
    };
    let num_variables = vars.count() + soft.count();

    let mut num_constraints = 0usize;
    let backend = pvars
        .minimise(objective.clone())
        .using(default_solver)
        .set_option("time_limit", cfg.time_limit)
        .set_option("threads", cfg.threads)
        .set_option("random_seed", cfg.seed)
        .set_option("output_flag", false);
    let backend = post_constraints(backend, &prep, &vars, &soft, opts, &mut num_constraints);

    tracing::info!(
        variables = num_variables,
        constraints = num_constraints,
        time_limit = cfg.time_limit,
        "launching back-end"
    );

    let t0 = Instant::now();
    match backend.solve() {
        Ok(sol) => {
            let elapsed = t0.elapsed().as_secs_f64();
            let (entries, assignments) = extract_entries(&prep, &vars, &sol);
            let objective_value = opts.use_soft.then(|| sol.eval(objective));
            SolveOutcome {
                status: classify_solved(elapsed, cfg.time_limit),
                entries,
                assignments,
                objective: objective_value,
                num_variables,
                num_constraints,
                elapsed,
            }
        }
        Err(e) => failure_outcome(e, t0.elapsed().as_secs_f64(), num_variables, num_constraints),
    }
}

/// Pass 1 of the two-pass strategy: decide assignments only.
pub(crate) fn solve_assignment(
    dm: &DomainModel,
    opts: &BuildOptions,
    weights: &SoftWeights,
    cfg: &BackendConfig,
) -> (SolveStatus, Option<AssignmentPlan>, f64) {
    let prep = Prep::new(dm);
    let mut pvars = ProblemVariables::new();
    let vars = declare_assignment_vars(&prep, weights, opts.use_soft, &mut pvars);
    let objective = if opts.use_soft {
        build_assignment_objective(&vars, weights)
    } else {
        Expression::from(0.0)
    };

    let mut num_constraints = 0usize;
    let backend = pvars
        .minimise(objective)
        .using(default_solver)
        .set_option("time_limit", cfg.time_limit)
        .set_option("threads", cfg.threads)
        .set_option("random_seed", cfg.seed)
        .set_option("output_flag", false);
    let backend = post_assignment_constraints(backend, &prep, &vars, opts, &mut num_constraints);

    tracing::info!(
        variables = vars.count(),
        constraints = num_constraints,
        "assignment pass"
    );

    let t0 = Instant::now();
    match backend.solve() {
        Ok(sol) => {
            let elapsed = t0.elapsed().as_secs_f64();
            let mut plan = AssignmentPlan::default();
            for ((tid, cid, sid), a) in &vars.assign {
                if sol.value(*a) > 0.5 {
                    plan.triples
                        .insert((tid.to_string(), cid.to_string(), sid.to_string()));
                }
            }
            for ((kid, g_idx, tid), g) in &vars.group_assign {
                if sol.value(*g) > 0.5 {
                    plan.groups
                        .insert((kid.to_string(), *g_idx), tid.to_string());
                }
            }
            (classify_solved(elapsed, cfg.time_limit), Some(plan), elapsed)
        }
        Err(ResolutionError::Infeasible) => {
            (SolveStatus::Infeasible, None, t0.elapsed().as_secs_f64())
        }
        Err(e) => {
            tracing::warn!(error = %e, "assignment pass gave no verdict");
            (SolveStatus::Unknown, None, t0.elapsed().as_secs_f64())
        }
    }
}

/// The back-end returns `Ok` only with a proven-optimal incumbent unless
/// it ran into the wall clock; near the limit we degrade the claim.
fn classify_solved(elapsed: f64, limit: f64) -> SolveStatus {
    if elapsed >= limit * 0.95 {
        SolveStatus::Feasible
    } else {
        SolveStatus::Optimal
    }
}

fn failure_outcome(
    e: ResolutionError,
    elapsed: f64,
    num_variables: usize,
    num_constraints: usize,
) -> SolveOutcome {
    let status = match e {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        other => {
            tracing::warn!(error = %other, "back-end returned no verdict");
            SolveStatus::Unknown
        }
    };
    SolveOutcome {
        status,
        entries: Vec::new(),
        assignments: Vec::new(),
        objective: None,
        num_variables,
        num_constraints,
        elapsed,
    }
}
