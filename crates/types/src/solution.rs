//! Decoded solver output and its JSON persistence.

use crate::{ClassId, CouplingId, SoftWeights, SubjectId, TeacherId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single lesson in the finished timetable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// 0-based weekday.
    pub day: u8,
    /// 1-based period number, as in the time grid.
    pub period: u8,
    pub teacher: TeacherId,
    pub class: ClassId,
    pub subject: SubjectId,
    /// Bound room instance, e.g. "physik-2"; None for regular classrooms.
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub coupling: Option<CouplingId>,
}

/// Which teacher covers which (class, subject), and with how many hours.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeacherAssignment {
    pub teacher: TeacherId,
    pub class: ClassId,
    pub subject: SubjectId,
    pub hours_per_week: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    /// Timeout or back-end gave up without a verdict.
    Unknown,
    Cancelled,
}

impl SolveStatus {
    pub fn is_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// The solve configuration that produced a solution, kept for re-loads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub time_limit_seconds: u32,
    pub num_workers: u32,
    pub seed: u64,
    pub use_soft: bool,
    pub two_pass: bool,
    pub weights: SoftWeights,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub entries: Vec<ScheduleEntry>,
    pub assignments: Vec<TeacherAssignment>,
    pub objective_value: Option<f64>,
    pub num_variables: usize,
    pub num_constraints: usize,
    pub solve_time_seconds: f64,
    pub config_snapshot: ConfigSnapshot,
}

impl Solution {
    pub fn class_schedule(&self, class: &ClassId) -> Vec<&ScheduleEntry> {
        self.entries.iter().filter(|e| &e.class == class).collect()
    }

    pub fn teacher_schedule(&self, teacher: &TeacherId) -> Vec<&ScheduleEntry> {
        self.entries
            .iter()
            .filter(|e| &e.teacher == teacher)
            .collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing solution to {}", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading solution from {}", path.display()))?;
        serde_json::from_str(&raw).context("parsing solution JSON")
    }
}
