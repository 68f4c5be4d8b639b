//! Domain model of the weekly school timetable problem.
//!
//! Everything the solver consumes is a concrete, typed value in this crate.
//! Entities own their data; cross-references are ids resolved through index
//! maps at the consumer layer. The `DomainModel` is immutable once built.

pub mod grid;
pub mod pinboard;
pub mod solution;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use grid::{DoubleBlock, LessonSlot, Pause, TimeGrid};
pub use pinboard::PinBoard;
pub use solution::{
    ConfigSnapshot, ScheduleEntry, Solution, SolveStatus, TeacherAssignment,
};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_newtype!(TeacherId);
id_newtype!(ClassId);
id_newtype!(SubjectId);
id_newtype!(RoomTypeId);
id_newtype!(CouplingId);
id_newtype!(TrackId);

/// One cell of the weekly raster: 0-based day, 1-based period number.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
pub struct Slot {
    pub day: u8,
    pub period: u8,
}

impl Slot {
    pub fn new(day: u8, period: u8) -> Self {
        Self { day, period }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DAYS: [&str; 6] = ["Mo", "Di", "Mi", "Do", "Fr", "Sa"];
        let day = DAYS.get(self.day as usize).copied().unwrap_or("??");
        write!(f, "{} {}.", day, self.period)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubjectCategory {
    Hauptfach,
    Sprache,
    Nw,
    Musisch,
    Sport,
    Gesellschaft,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub short: String,
    pub category: SubjectCategory,
    /// Special room type this subject must be taught in, if any.
    #[serde(default)]
    pub room_type: Option<RoomTypeId>,
    #[serde(default)]
    pub double_required: bool,
    #[serde(default)]
    pub double_preferred: bool,
    #[serde(default)]
    pub is_hauptfach: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    /// Subjects this teacher is qualified to teach.
    pub subjects: Vec<SubjectId>,
    /// Target weekly teaching hours.
    pub deputat: u32,
    /// Lower end of the tolerated weekly-hours band.
    pub deputat_min: u32,
    /// Upper end of the tolerated weekly-hours band.
    pub deputat_max: u32,
    #[serde(default)]
    pub unavailable: Vec<Slot>,
    /// Days (0-based) the teacher would prefer to keep free.
    #[serde(default)]
    pub preferred_free_days: Vec<u8>,
    #[serde(default = "default_max_hours_per_day")]
    pub max_hours_per_day: u32,
    #[serde(default = "default_max_gaps_per_day")]
    pub max_gaps_per_day: u32,
    /// 0 means no weekly gap cap.
    #[serde(default)]
    pub max_gaps_per_week: u32,
    #[serde(default)]
    pub can_teach_sek2: bool,
}

fn default_max_hours_per_day() -> u32 {
    6
}

fn default_max_gaps_per_day() -> u32 {
    2
}

impl Teacher {
    pub fn is_qualified(&self, subject: &SubjectId) -> bool {
        self.subjects.contains(subject)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CourseType {
    Lk,
    Gk,
    #[default]
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: ClassId,
    pub grade: u8,
    #[serde(default)]
    pub label: String,
    /// Weekly hours per subject; only subjects with hours > 0 are listed.
    pub curriculum: BTreeMap<SubjectId, u32>,
    /// Last period this class may be scheduled in.
    pub max_period: u8,
    /// Upper-secondary course lane (Sek II) instead of a regular class.
    #[serde(default)]
    pub is_course: bool,
    #[serde(default)]
    pub course_type: CourseType,
}

impl SchoolClass {
    pub fn total_weekly_hours(&self) -> u32 {
        self.curriculum.values().sum()
    }
}

/// A special-room pool, e.g. three physics rooms.
///
/// Regular classrooms are not modelled; subjects without a `room_type`
/// draw from an unlimited pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub display_name: String,
    /// Number of rooms of this type that can be used concurrently.
    pub capacity: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CouplingKind {
    ReliEthik,
    Wpf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CouplingGroup {
    pub label: String,
    pub subject: SubjectId,
    pub hours_per_week: u32,
}

/// A parallel-class lesson split into subject groups.
///
/// All involved classes are blocked during every coupling slot; each group
/// gets its own teacher, chosen by the solver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupling {
    pub id: CouplingId,
    pub kind: CouplingKind,
    pub involved_classes: Vec<ClassId>,
    pub groups: Vec<CouplingGroup>,
    pub hours_per_week: u32,
}

/// A lane of Sek-II courses that run in lock-step on identical slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CourseTrack {
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    pub course_ids: Vec<ClassId>,
    pub hours_per_week: u32,
}

/// A caller-fixed lesson placement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pin {
    pub teacher: TeacherId,
    pub class: ClassId,
    pub subject: SubjectId,
    pub slot: Slot,
}

/// Non-negative weights of the soft objective terms.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoftWeights {
    pub gaps: u32,
    pub workload: u32,
    pub day_wishes: u32,
    pub compact: u32,
    pub double_lessons: u32,
    pub subject_spread: u32,
    pub deputat_dev: u32,
}

impl Default for SoftWeights {
    fn default() -> Self {
        Self {
            gaps: 200,
            workload: 50,
            day_wishes: 20,
            compact: 30,
            double_lessons: 40,
            subject_spread: 60,
            deputat_dev: 50,
        }
    }
}

impl SoftWeights {
    pub fn zero() -> Self {
        Self {
            gaps: 0,
            workload: 0,
            day_wishes: 0,
            compact: 0,
            double_lessons: 0,
            subject_spread: 0,
            deputat_dev: 0,
        }
    }

    /// Sets a weight by its public key. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, value: u32) -> bool {
        match key {
            "gaps" => self.gaps = value,
            "workload" => self.workload = value,
            "day_wishes" => self.day_wishes = value,
            "compact" => self.compact = value,
            "double_lessons" => self.double_lessons = value,
            "subject_spread" => self.subject_spread = value,
            "deputat_dev" => self.deputat_dev = value,
            _ => return false,
        }
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolverLimits {
    pub time_limit_seconds: u32,
    /// 0 = detect logical cores.
    pub num_workers: u32,
    pub seed: u64,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            time_limit_seconds: 300,
            num_workers: 0,
            seed: 0,
        }
    }
}

/// The fully populated scheduling problem handed to the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainModel {
    pub time_grid: TimeGrid,
    pub subjects: Vec<Subject>,
    pub rooms: Vec<RoomType>,
    pub classes: Vec<SchoolClass>,
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub couplings: Vec<Coupling>,
    #[serde(default)]
    pub course_tracks: Vec<CourseTrack>,
    #[serde(default)]
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub weights: SoftWeights,
    #[serde(default)]
    pub limits: SolverLimits,
}

impl DomainModel {
    pub fn subject(&self, id: &SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| &s.id == id)
    }

    pub fn class(&self, id: &ClassId) -> Option<&SchoolClass> {
        self.classes.iter().find(|c| &c.id == id)
    }

    pub fn teacher(&self, id: &TeacherId) -> Option<&Teacher> {
        self.teachers.iter().find(|t| &t.id == id)
    }

    pub fn has_courses(&self) -> bool {
        self.classes.iter().any(|c| c.is_course)
    }

    /// Total weekly lesson demand over all classes.
    pub fn total_demand(&self) -> u32 {
        self.classes.iter().map(|c| c.total_weekly_hours()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> DomainModel {
        DomainModel {
            time_grid: grid::TimeGrid::default_gymnasium(),
            subjects: vec![Subject {
                id: "Ma".into(),
                name: "Mathematik".into(),
                short: "Ma".into(),
                category: SubjectCategory::Hauptfach,
                room_type: None,
                double_required: false,
                double_preferred: true,
                is_hauptfach: true,
            }],
            rooms: vec![],
            classes: vec![SchoolClass {
                id: "5a".into(),
                grade: 5,
                label: "a".into(),
                curriculum: [(SubjectId::from("Ma"), 4u32)].into_iter().collect(),
                max_period: 7,
                is_course: false,
                course_type: CourseType::None,
            }],
            teachers: vec![Teacher {
                id: "MUL".into(),
                name: "Müller".into(),
                subjects: vec!["Ma".into()],
                deputat: 26,
                deputat_min: 20,
                deputat_max: 28,
                unavailable: vec![Slot::new(0, 1)],
                preferred_free_days: vec![4],
                max_hours_per_day: 6,
                max_gaps_per_day: 2,
                max_gaps_per_week: 0,
                can_teach_sek2: false,
            }],
            couplings: vec![],
            course_tracks: vec![],
            pins: vec![],
            weights: SoftWeights::default(),
            limits: SolverLimits::default(),
        }
    }

    #[test]
    fn serde_round_trip_is_lossless() {
        let model = sample_model();
        let json = serde_json::to_string_pretty(&model).unwrap();
        let back: DomainModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.classes[0].curriculum[&SubjectId::from("Ma")], 4);
        assert_eq!(back.teachers[0].unavailable, vec![Slot::new(0, 1)]);
        // Field order is stable: a second serialisation is byte-identical.
        assert_eq!(json, serde_json::to_string_pretty(&back).unwrap());
    }

    #[test]
    fn default_weights_match_documented_values() {
        let w = SoftWeights::default();
        assert_eq!(w.gaps, 200);
        assert_eq!(w.subject_spread, 60);
        assert_eq!(SoftWeights::zero().gaps, 0);
    }

    #[test]
    fn weight_set_by_key() {
        let mut w = SoftWeights::default();
        assert!(w.set("gaps", 7));
        assert_eq!(w.gaps, 7);
        assert!(!w.set("nope", 1));
    }

    #[test]
    fn slot_display_uses_day_short_names() {
        assert_eq!(Slot::new(0, 3).to_string(), "Mo 3.");
        assert_eq!(Slot::new(4, 1).to_string(), "Fr 1.");
    }
}
