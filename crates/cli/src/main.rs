//! Command-line driver for the timetable solver.
//!
//! Exit codes: 0 = optimal or feasible, 2 = infeasible, 3 = unknown or
//! timeout, 4 = invalid input.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use plan_core::{audit, SolveContext, SolveOptions, Solver};
use solver_cp::{ChangeSet, CpScheduler};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::{DomainModel, Solution};

#[derive(Parser)]
#[command(name = "stundenplan", version, about = "Weekly school timetable solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a timetable from a domain-model JSON file.
    Solve(SolveArgs),
    /// Run the static feasibility audit only.
    Check {
        #[arg(long)]
        data: PathBuf,
    },
    /// Validate a stored solution against a domain model.
    Validate {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        solution: PathBuf,
    },
}

#[derive(Args)]
struct SolveArgs {
    /// Domain model (JSON).
    #[arg(long)]
    data: PathBuf,
    /// Where to store the solution (JSON).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Overrides time_limit_seconds of the model.
    #[arg(long, value_name = "SECONDS")]
    time_limit: Option<u32>,
    /// Sets every soft weight to zero.
    #[arg(long)]
    no_soft: bool,
    /// Forces the two-pass strategy on.
    #[arg(long, overrides_with = "no_two_pass")]
    two_pass: bool,
    /// Forces the two-pass strategy off.
    #[arg(long)]
    no_two_pass: bool,
    /// Incremental re-solve against a previous solution.
    #[arg(long, requires = "previous")]
    incremental: bool,
    /// Previous solution for --incremental.
    #[arg(long)]
    previous: Option<PathBuf>,
    /// Changed entities for --incremental, e.g. "t:MUL,c:5a".
    #[arg(long)]
    changed: Option<String>,
    /// Extra pinned lessons (JSON file written by the pin board).
    #[arg(long)]
    pins: Option<PathBuf>,
    /// Per-weight overrides, e.g. "gaps=100,compact=0".
    #[arg(long)]
    weights: Option<String>,
    /// Run the constraint relaxer on infeasibility.
    #[arg(long)]
    diagnose: bool,
}

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INFEASIBLE: u8 = 2;
const EXIT_UNKNOWN: u8 = 3;
const EXIT_INVALID: u8 = 4;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Solve(args) => run_solve(args),
        Command::Check { data } => run_check(&data),
        Command::Validate { data, solution } => run_validate(&data, &solution),
    };
    ExitCode::from(code)
}

fn load_model(path: &Path) -> anyhow::Result<DomainModel> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading domain model from {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing domain model JSON")
}

fn run_solve(args: SolveArgs) -> u8 {
    let mut model = match load_model(&args.data) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "cannot load domain model");
            return EXIT_INVALID;
        }
    };

    if let Some(spec) = &args.weights {
        if let Err(e) = apply_weight_overrides(&mut model, spec) {
            tracing::error!(error = %e, "invalid --weights");
            return EXIT_INVALID;
        }
    }

    if let Some(path) = &args.pins {
        match types::PinBoard::load_json(path) {
            Ok(board) => model.pins.extend(board.pins().iter().cloned()),
            Err(e) => {
                tracing::error!(error = %e, "cannot load pins");
                return EXIT_INVALID;
            }
        }
    }

    let two_pass = match (args.two_pass, args.no_two_pass) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let ctx = SolveContext {
        options: SolveOptions {
            no_soft: args.no_soft,
            two_pass,
            time_limit_override: args.time_limit,
            diagnose: args.diagnose,
        },
        ..SolveContext::default()
    };

    let scheduler = CpScheduler::new();
    let result = if args.incremental {
        let previous = match args
            .previous
            .as_deref()
            .context("--incremental needs --previous")
            .and_then(Solution::load_json)
        {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot load previous solution");
                return EXIT_INVALID;
            }
        };
        let changes = match parse_changes(args.changed.as_deref().unwrap_or("")) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "invalid --changed");
                return EXIT_INVALID;
            }
        };
        scheduler.resolve_incremental(&model, &previous, &changes, &ctx)
    } else {
        scheduler.solve(&model, &ctx)
    };

    match result {
        Ok(solution) => {
            println!(
                "{:?}: {} lessons, objective {}",
                solution.status,
                solution.entries.len(),
                solution
                    .objective_value
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".into())
            );
            if let Some(out) = &args.out {
                if let Err(e) = solution.save_json(out) {
                    tracing::error!(error = %e, "cannot write solution");
                    return EXIT_ERROR;
                }
                tracing::info!(path = %out.display(), "solution written");
            }
            EXIT_OK
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "solve failed");
            match e.kind() {
                "invalid_input" => EXIT_INVALID,
                "infeasible_static" | "infeasible_solve" => EXIT_INFEASIBLE,
                "timeout" | "cancelled" => EXIT_UNKNOWN,
                _ => EXIT_ERROR,
            }
        }
    }
}

fn run_check(data: &Path) -> u8 {
    let model = match load_model(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "cannot load domain model");
            return EXIT_INVALID;
        }
    };
    if let Err(e) = plan_core::validate_model(&model) {
        tracing::error!(error = %e, "structural validation failed");
        return EXIT_INVALID;
    }
    let report = audit(&model);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if report.feasible {
        println!("feasible ({} warnings)", report.warnings.len());
        EXIT_OK
    } else {
        EXIT_INFEASIBLE
    }
}

fn run_validate(data: &Path, solution: &Path) -> u8 {
    let model = match load_model(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "cannot load domain model");
            return EXIT_INVALID;
        }
    };
    let solution = match Solution::load_json(solution) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "cannot load solution");
            return EXIT_INVALID;
        }
    };
    let report = plan_core::SolutionValidator::new().validate(&solution, &model);
    for v in &report.violations {
        println!(
            "{}: {} [{}] {}",
            match v.severity {
                plan_core::Severity::Error => "error",
                plan_core::Severity::Warning => "warning",
            },
            v.constraint,
            v.entity,
            v.description
        );
    }
    let scores = plan_core::scoring::soft_scores(&model, &solution.entries);
    println!(
        "quality: {} gaps (excess {}), workload spread {}, day-wish hits {}, \
         edge periods {}, optional doubles {}, spread excess {}, deputat deviation {}",
        scores.gaps,
        scores.gap_excess,
        scores.workload_spread,
        scores.day_wish_hits,
        scores.edge_periods,
        scores.optional_doubles,
        scores.spread_excess,
        scores.deputat_deviation
    );
    if report.is_valid() {
        println!("valid ({} warnings)", report.warnings().count());
        EXIT_OK
    } else {
        EXIT_INFEASIBLE
    }
}

fn apply_weight_overrides(model: &mut DomainModel, spec: &str) -> anyhow::Result<()> {
    for pair in spec.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        let value: u32 = value
            .trim()
            .parse()
            .with_context(|| format!("weight '{key}' needs a non-negative integer"))?;
        if !model.weights.set(key.trim(), value) {
            anyhow::bail!("unknown weight '{key}'");
        }
    }
    Ok(())
}

fn parse_changes(spec: &str) -> anyhow::Result<ChangeSet> {
    let mut changes = ChangeSet::default();
    for token in spec.split(',').filter(|t| !t.is_empty()) {
        match token.trim().split_once(':') {
            Some(("t", id)) => {
                changes.teachers.insert(id.into());
            }
            Some(("c", id)) => {
                changes.classes.insert(id.into());
            }
            _ => anyhow::bail!("expected t:<teacher> or c:<class>, got '{token}'"),
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_override_parsing() {
        let mut model = DomainModel {
            time_grid: types::TimeGrid::default_gymnasium(),
            subjects: vec![],
            rooms: vec![],
            classes: vec![],
            teachers: vec![],
            couplings: vec![],
            course_tracks: vec![],
            pins: vec![],
            weights: types::SoftWeights::default(),
            limits: types::SolverLimits::default(),
        };
        apply_weight_overrides(&mut model, "gaps=5,compact=0").unwrap();
        assert_eq!(model.weights.gaps, 5);
        assert_eq!(model.weights.compact, 0);
        assert!(apply_weight_overrides(&mut model, "nope=1").is_err());
    }

    #[test]
    fn change_set_parsing() {
        let changes = parse_changes("t:MUL,c:5a").unwrap();
        assert!(changes.teachers.contains(&"MUL".into()));
        assert!(changes.classes.contains(&"5a".into()));
        assert!(parse_changes("x:1").is_err());
    }
}
