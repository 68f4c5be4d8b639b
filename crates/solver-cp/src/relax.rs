//! Infeasibility diagnosis by stripping hard-constraint families.
//!
//! Families are removed one at a time in a fixed order; the first removal
//! that yields a feasible model names the offender. If no single family
//! helps, everything is relaxed at once as a last resort.

use crate::driver::{solve_full, BackendConfig};
use crate::model::BuildOptions;
use plan_core::CancelToken;
use types::{DomainModel, SoftWeights, SolveStatus};

#[derive(Clone, Debug)]
pub struct RelaxResult {
    pub name: &'static str,
    pub description: &'static str,
    pub status: SolveStatus,
    pub solve_time: f64,
}

#[derive(Clone, Debug)]
pub struct RelaxReport {
    pub original_status: SolveStatus,
    pub relaxations: Vec<RelaxResult>,
    /// The first family whose removal made the model feasible.
    pub first_feasible: Option<&'static str>,
    pub recommendation: String,
}

/// Extra hours the deputat band is widened by in the `wide_deputat` step.
const DEPUTAT_SLACK: u32 = 4;

struct Family {
    name: &'static str,
    description: &'static str,
    apply: fn(&mut BuildOptions),
}

const FAMILIES: [Family; 5] = [
    Family {
        name: "no_double_required",
        description: "double-period requirements dropped",
        apply: |o| o.enforce_doubles = false,
    },
    Family {
        name: "no_room_limits",
        description: "special-room capacities unlimited",
        apply: |o| o.room_limits = false,
    },
    Family {
        name: "no_couplings",
        description: "all couplings removed",
        apply: |o| o.couplings = false,
    },
    Family {
        name: "wide_deputat",
        description: "deputat band widened",
        apply: |o| o.deputat_slack = DEPUTAT_SLACK,
    },
    Family {
        name: "no_compactness",
        description: "class compactness dropped",
        apply: |o| o.compactness = false,
    },
];

pub(crate) fn run_diagnosis(
    model: &DomainModel,
    original_status: SolveStatus,
    cfg: &BackendConfig,
    per_family_limit: f64,
    cancel: &CancelToken,
) -> RelaxReport {
    let weights = SoftWeights::zero();
    let probe_cfg = BackendConfig {
        time_limit: per_family_limit.min(cfg.time_limit),
        ..*cfg
    };

    let mut relaxations: Vec<RelaxResult> = Vec::new();
    let mut first_feasible: Option<&'static str> = None;

    for family in &FAMILIES {
        if cancel.is_cancelled() {
            break;
        }
        let mut opts = BuildOptions {
            use_soft: false,
            ..BuildOptions::default()
        };
        (family.apply)(&mut opts);
        let outcome = solve_full(model, &opts, &weights, &probe_cfg);
        tracing::info!(
            family = family.name,
            status = ?outcome.status,
            time = outcome.elapsed,
            "relaxation probe"
        );
        let feasible = outcome.status.is_solution();
        relaxations.push(RelaxResult {
            name: family.name,
            description: family.description,
            status: outcome.status,
            solve_time: outcome.elapsed,
        });
        if feasible {
            first_feasible = Some(family.name);
            break;
        }
    }

    if first_feasible.is_none() && !cancel.is_cancelled() {
        let opts = BuildOptions {
            use_soft: false,
            enforce_doubles: false,
            room_limits: false,
            couplings: false,
            deputat_slack: DEPUTAT_SLACK,
            compactness: false,
            ..BuildOptions::default()
        };
        let outcome = solve_full(model, &opts, &weights, &probe_cfg);
        let feasible = outcome.status.is_solution();
        relaxations.push(RelaxResult {
            name: "all_combined",
            description: "all relaxations at once",
            status: outcome.status,
            solve_time: outcome.elapsed,
        });
        if feasible {
            first_feasible = Some("all_combined");
        }
    }

    let recommendation = build_recommendation(first_feasible, &relaxations);
    RelaxReport {
        original_status,
        relaxations,
        first_feasible,
        recommendation,
    }
}

fn build_recommendation(first: Option<&'static str>, results: &[RelaxResult]) -> String {
    match first {
        Some("no_double_required") => {
            "double periods: some double_required subjects have too few weekly hours \
             or too few free block combinations"
                .into()
        }
        Some("no_room_limits") => {
            "special rooms: too many classes need the same room type at once; \
             add rooms or spread the hours"
                .into()
        }
        Some("no_couplings") => {
            "couplings: the shared coupling slots conflict with regular lessons; \
             check overlaps between coupled and direct hours"
                .into()
        }
        Some("wide_deputat") => {
            "deputat: the weekly-hours band is too tight; raise the deputat tolerance \
             or adjust teacher loads"
                .into()
        }
        Some("no_compactness") => {
            "compactness: the prefix rule for class days leaves no feasible placement; \
             allow later start periods or reduce hours"
                .into()
        }
        Some("all_combined") => {
            "several constraint families conflict at the same time; \
             relax them step by step"
                .into()
        }
        Some(other) => format!("relaxing '{other}' restores feasibility"),
        None => {
            if results.iter().all(|r| r.status == SolveStatus::Unknown) {
                "every relaxation probe timed out; raise the time limit".into()
            } else {
                "the model stays infeasible under every relaxation; \
                 most likely a subject has no qualified teachers"
                    .into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_names_the_offending_family() {
        let rec = build_recommendation(Some("wide_deputat"), &[]);
        assert!(rec.contains("deputat"));
        let rec = build_recommendation(Some("no_room_limits"), &[]);
        assert!(rec.contains("rooms"));
    }

    #[test]
    fn all_unknown_probes_suggest_more_time() {
        let results = vec![RelaxResult {
            name: "no_couplings",
            description: "",
            status: SolveStatus::Unknown,
            solve_time: 30.0,
        }];
        assert!(build_recommendation(None, &results).contains("time limit"));
    }
}
