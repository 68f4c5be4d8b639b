//! Core services around the timetable solver: the error taxonomy, structural
//! model validation, the feasibility audit, the slot index, soft-score
//! recomputation and the independent solution validator.
//!
//! The model builder lives in `solver-cp`; nothing in this crate posts
//! constraints.

pub mod audit;
pub mod scoring;
pub mod slots;
pub mod validate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use audit::{audit, FeasibilityReport};
pub use slots::SlotIndex;
pub use validate::{Severity, SolutionValidator, ValidationReport, Violation};

use std::collections::{HashMap, HashSet};
use types::{DomainModel, Solution};

#[derive(Debug, Error)]
pub enum SchedError {
    /// The domain model fails a structural invariant.
    #[error("invalid input ({entity}): {message}")]
    InvalidInput { entity: String, message: String },

    /// The feasibility audit rejected the model before any solve.
    #[error("statically infeasible: {0}")]
    InfeasibleStatic(FeasibilityReport),

    /// The back-end proved the model infeasible.
    #[error("solver returned INFEASIBLE{}", .hint.as_deref().map(|h| format!("; hint: {h}")).unwrap_or_default())]
    InfeasibleSolve { hint: Option<String> },

    /// The back-end hit the wall-clock limit without a verdict.
    #[error("solver returned UNKNOWN within the time limit; raise time_limit_seconds")]
    Timeout,

    /// The room post-pass could not bind every lesson to a room instance.
    #[error("room assignment failed: {0}")]
    RoomAssignment(String),

    /// Caller-initiated cancellation; carries the best incumbent if any.
    #[error("solve cancelled by caller")]
    Cancelled { incumbent: Option<Box<Solution>> },

    /// Post-solve invariant broken (validator disagrees with the solver,
    /// decoder integrity failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedError {
    /// Stable machine-readable kind, independent of the display message.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedError::InvalidInput { .. } => "invalid_input",
            SchedError::InfeasibleStatic(_) => "infeasible_static",
            SchedError::InfeasibleSolve { .. } => "infeasible_solve",
            SchedError::Timeout => "timeout",
            SchedError::RoomAssignment(_) => "room_assignment",
            SchedError::Cancelled { .. } => "cancelled",
            SchedError::Internal(_) => "internal",
        }
    }

    pub fn invalid_input(entity: impl Into<String>, message: impl Into<String>) -> Self {
        SchedError::InvalidInput {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// Cooperative cancellation signal shared between caller and driver.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress tick emitted by the driver at phase boundaries.
#[derive(Clone, Debug)]
pub struct ProgressStats {
    pub phase: &'static str,
    pub wall_time_seconds: f64,
    pub best_objective: Option<f64>,
    pub solutions_found: u32,
    pub num_variables: usize,
    pub num_constraints: usize,
}

/// Caller-supplied sink for progress ticks and incumbent snapshots.
pub trait ProgressSink {
    fn on_progress(&self, stats: &ProgressStats);

    fn on_solution(&self, _snapshot: &Solution) {}
}

/// Driver-facing knobs beyond what the `DomainModel` carries.
#[derive(Clone, Debug, Default)]
pub struct SolveOptions {
    /// Forces every soft weight to zero.
    pub no_soft: bool,
    /// Overrides the auto two-pass decision (`Some(true)` forces it on).
    pub two_pass: Option<bool>,
    pub time_limit_override: Option<u32>,
    /// Run the constraint relaxer on INFEASIBLE.
    pub diagnose: bool,
}

pub struct SolveContext<'a> {
    pub options: SolveOptions,
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: CancelToken,
}

impl Default for SolveContext<'_> {
    fn default() -> Self {
        Self {
            options: SolveOptions::default(),
            progress: None,
            cancel: CancelToken::new(),
        }
    }
}

pub trait Solver {
    fn solve(&self, model: &DomainModel, ctx: &SolveContext<'_>) -> Result<Solution, SchedError>;
}

/// Structural invariants of the domain model (spec-level "InvalidInput").
///
/// The feasibility audit assumes these hold; run this first.
pub fn validate_model(model: &DomainModel) -> Result<(), SchedError> {
    model
        .time_grid
        .validate()
        .map_err(|m| SchedError::invalid_input("time_grid", m))?;

    check_unique("subject", model.subjects.iter().map(|s| s.id.0.as_str()))?;
    check_unique("teacher", model.teachers.iter().map(|t| t.id.0.as_str()))?;
    check_unique("class", model.classes.iter().map(|c| c.id.0.as_str()))?;
    check_unique("room_type", model.rooms.iter().map(|r| r.id.0.as_str()))?;
    check_unique("coupling", model.couplings.iter().map(|k| k.id.0.as_str()))?;
    check_unique("track", model.course_tracks.iter().map(|t| t.id.0.as_str()))?;

    let subjects: HashSet<&str> = model.subjects.iter().map(|s| s.id.0.as_str()).collect();
    let room_types: HashSet<&str> = model.rooms.iter().map(|r| r.id.0.as_str()).collect();
    let classes: HashMap<&str, &types::SchoolClass> =
        model.classes.iter().map(|c| (c.id.0.as_str(), c)).collect();
    let grid_periods: HashSet<u8> = model
        .time_grid
        .lesson_slots
        .iter()
        .map(|s| s.period_number)
        .collect();

    for s in &model.subjects {
        if let Some(rt) = &s.room_type {
            if !room_types.contains(rt.0.as_str()) {
                return Err(SchedError::invalid_input(
                    s.id.0.clone(),
                    format!("references unknown room type {rt}"),
                ));
            }
        }
    }

    for t in &model.teachers {
        for s in &t.subjects {
            if !subjects.contains(s.0.as_str()) {
                return Err(SchedError::invalid_input(
                    t.id.0.clone(),
                    format!("qualified for unknown subject {s}"),
                ));
            }
        }
        if !(t.deputat_min <= t.deputat && t.deputat <= t.deputat_max) {
            return Err(SchedError::invalid_input(
                t.id.0.clone(),
                format!(
                    "deputat band {}..{} does not contain target {}",
                    t.deputat_min, t.deputat_max, t.deputat
                ),
            ));
        }
        for slot in &t.unavailable {
            if slot.day >= model.time_grid.days_per_week || !grid_periods.contains(&slot.period) {
                return Err(SchedError::invalid_input(
                    t.id.0.clone(),
                    format!("unavailable slot {slot} outside the time grid"),
                ));
            }
        }
    }

    for c in &model.classes {
        for (s, _) in c.curriculum.iter().filter(|(_, h)| **h > 0) {
            if !subjects.contains(s.0.as_str()) {
                return Err(SchedError::invalid_input(
                    c.id.0.clone(),
                    format!("curriculum references unknown subject {s}"),
                ));
            }
        }
        let ceiling = if c.is_course {
            model.time_grid.sek2_max_period
        } else {
            model.time_grid.sek1_max_period
        };
        if c.max_period > ceiling || c.max_period == 0 {
            return Err(SchedError::invalid_input(
                c.id.0.clone(),
                format!("max_period {} outside 1..={}", c.max_period, ceiling),
            ));
        }
    }

    for k in &model.couplings {
        if k.involved_classes.len() < 2 {
            return Err(SchedError::invalid_input(
                k.id.0.clone(),
                "coupling needs at least two involved classes",
            ));
        }
        let mut grades = HashSet::new();
        for cid in &k.involved_classes {
            match classes.get(cid.0.as_str()) {
                Some(c) => {
                    grades.insert(c.grade);
                }
                None => {
                    return Err(SchedError::invalid_input(
                        k.id.0.clone(),
                        format!("involves unknown class {cid}"),
                    ))
                }
            }
        }
        if grades.len() > 1 {
            return Err(SchedError::invalid_input(
                k.id.0.clone(),
                "involved classes span more than one grade",
            ));
        }
        if k.groups.is_empty() {
            return Err(SchedError::invalid_input(k.id.0.clone(), "coupling has no groups"));
        }
        for g in &k.groups {
            if !subjects.contains(g.subject.0.as_str()) {
                return Err(SchedError::invalid_input(
                    k.id.0.clone(),
                    format!("group '{}' teaches unknown subject {}", g.label, g.subject),
                ));
            }
            if g.hours_per_week != k.hours_per_week {
                return Err(SchedError::invalid_input(
                    k.id.0.clone(),
                    format!(
                        "group '{}' has {}h but the coupling runs {}h",
                        g.label, g.hours_per_week, k.hours_per_week
                    ),
                ));
            }
        }
    }

    for tr in &model.course_tracks {
        if tr.course_ids.len() < 2 {
            return Err(SchedError::invalid_input(
                tr.id.0.clone(),
                "course track needs at least two courses",
            ));
        }
        for cid in &tr.course_ids {
            match classes.get(cid.0.as_str()) {
                Some(c) if c.is_course => {}
                Some(_) => {
                    return Err(SchedError::invalid_input(
                        tr.id.0.clone(),
                        format!("{cid} is not a course"),
                    ))
                }
                None => {
                    return Err(SchedError::invalid_input(
                        tr.id.0.clone(),
                        format!("references unknown course {cid}"),
                    ))
                }
            }
        }
    }

    for pin in &model.pins {
        let class = classes.get(pin.class.0.as_str()).ok_or_else(|| {
            SchedError::invalid_input("pin", format!("unknown class {}", pin.class))
        })?;
        let teacher = model.teacher(&pin.teacher).ok_or_else(|| {
            SchedError::invalid_input("pin", format!("unknown teacher {}", pin.teacher))
        })?;
        if !subjects.contains(pin.subject.0.as_str()) {
            return Err(SchedError::invalid_input(
                "pin",
                format!("unknown subject {}", pin.subject),
            ));
        }
        if !teacher.is_qualified(&pin.subject) {
            return Err(SchedError::invalid_input(
                "pin",
                format!("{} is not qualified for {}", pin.teacher, pin.subject),
            ));
        }
        if pin.slot.period > class.max_period || pin.slot.day >= model.time_grid.days_per_week {
            return Err(SchedError::invalid_input(
                "pin",
                format!("slot {} outside the raster of {}", pin.slot, pin.class),
            ));
        }
    }

    Ok(())
}

fn check_unique<'a>(
    entity: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), SchedError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SchedError::invalid_input(
                entity,
                format!("duplicate id '{id}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{CourseType, Pin, SchoolClass, Slot, SolverLimits, SoftWeights, Subject,
        SubjectCategory, Teacher, TimeGrid};

    pub(crate) fn subject(id: &str, cat: SubjectCategory) -> Subject {
        Subject {
            id: id.into(),
            name: id.into(),
            short: id.into(),
            category: cat,
            room_type: None,
            double_required: false,
            double_preferred: false,
            is_hauptfach: matches!(cat, SubjectCategory::Hauptfach),
        }
    }

    pub(crate) fn teacher(id: &str, subjects: &[&str], deputat: u32) -> Teacher {
        Teacher {
            id: id.into(),
            name: id.into(),
            subjects: subjects.iter().map(|s| (*s).into()).collect(),
            deputat,
            deputat_min: 0,
            deputat_max: deputat + 2,
            unavailable: vec![],
            preferred_free_days: vec![],
            max_hours_per_day: 6,
            max_gaps_per_day: 2,
            max_gaps_per_week: 0,
            can_teach_sek2: false,
        }
    }

    pub(crate) fn class(id: &str, grade: u8, curriculum: &[(&str, u32)]) -> SchoolClass {
        SchoolClass {
            id: id.into(),
            grade,
            label: id.chars().last().unwrap_or('a').to_string(),
            curriculum: curriculum.iter().map(|(s, h)| ((*s).into(), *h)).collect(),
            max_period: 7,
            is_course: false,
            course_type: CourseType::None,
        }
    }

    pub(crate) fn tiny_model() -> DomainModel {
        DomainModel {
            time_grid: TimeGrid::default_gymnasium(),
            subjects: vec![
                subject("Ma", SubjectCategory::Hauptfach),
                subject("De", SubjectCategory::Hauptfach),
            ],
            rooms: vec![],
            classes: vec![class("5a", 5, &[("Ma", 4), ("De", 4)])],
            teachers: vec![teacher("MUL", &["Ma"], 10), teacher("SCH", &["De"], 10)],
            couplings: vec![],
            course_tracks: vec![],
            pins: vec![],
            weights: SoftWeights::default(),
            limits: SolverLimits::default(),
        }
    }

    #[test]
    fn tiny_model_is_structurally_valid() {
        assert!(validate_model(&tiny_model()).is_ok());
    }

    #[test]
    fn duplicate_teacher_id_is_rejected() {
        let mut m = tiny_model();
        m.teachers.push(teacher("MUL", &["De"], 10));
        let err = validate_model(&m).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn pin_with_unqualified_teacher_is_rejected() {
        let mut m = tiny_model();
        m.pins.push(Pin {
            teacher: "MUL".into(),
            class: "5a".into(),
            subject: "De".into(),
            slot: Slot::new(0, 3),
        });
        assert!(validate_model(&m).is_err());
    }

    #[test]
    fn pin_beyond_class_ceiling_is_rejected() {
        let mut m = tiny_model();
        m.pins.push(Pin {
            teacher: "MUL".into(),
            class: "5a".into(),
            subject: "Ma".into(),
            slot: Slot::new(0, 9),
        });
        assert!(validate_model(&m).is_err());
    }

    #[test]
    fn coupling_across_grades_is_rejected() {
        let mut m = tiny_model();
        m.classes.push(class("6a", 6, &[("Ma", 4)]));
        m.couplings.push(types::Coupling {
            id: "reli_5".into(),
            kind: types::CouplingKind::ReliEthik,
            involved_classes: vec!["5a".into(), "6a".into()],
            groups: vec![types::CouplingGroup {
                label: "ethik".into(),
                subject: "De".into(),
                hours_per_week: 2,
            }],
            hours_per_week: 2,
        });
        assert!(validate_model(&m).is_err());
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
