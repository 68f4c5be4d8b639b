//! Static feasibility audit: resource arithmetic before any solve.
//!
//! Everything here is O(|teachers| · |classes|); no model is built. The
//! audit assumes `validate_model` has already passed.

use crate::slots::SlotIndex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use types::{CouplingKind, DomainModel, SubjectId};

#[derive(Clone, Debug, Default)]
pub struct FeasibilityReport {
    pub feasible: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl fmt::Display for FeasibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "feasible ({} warnings)", self.warnings.len())
        } else {
            write!(f, "{}", self.errors.join("; "))
        }
    }
}

/// Subjects whose class-level demand is satisfied through a coupling and
/// therefore must not be counted against the direct teacher pool.
pub fn coupling_covered_subjects(model: &DomainModel) -> BTreeMap<&str, HashSet<SubjectId>> {
    let mut covered: BTreeMap<&str, HashSet<SubjectId>> = BTreeMap::new();
    for coupling in &model.couplings {
        for class_id in &coupling.involved_classes {
            let entry = covered.entry(class_id.0.as_str()).or_default();
            match coupling.kind {
                CouplingKind::Wpf => {
                    entry.insert(SubjectId::from("WPF"));
                }
                CouplingKind::ReliEthik => {
                    for group in &coupling.groups {
                        entry.insert(group.subject.clone());
                    }
                }
            }
        }
    }
    covered
}

pub fn audit(model: &DomainModel) -> FeasibilityReport {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let slots = SlotIndex::new(&model.time_grid);
    let days = model.time_grid.days_per_week as u32;
    let has_courses = model.has_courses();
    let school_max = if has_courses {
        model.time_grid.sek2_max_period
    } else {
        model.time_grid.sek1_max_period
    };
    let slots_per_week = school_max as u32 * days;

    let covered = coupling_covered_subjects(model);
    let covered_anywhere: HashSet<&SubjectId> = covered.values().flatten().collect();

    // Demand per subject, coupling-covered entries excluded per class.
    let mut subject_need: BTreeMap<&SubjectId, u32> = BTreeMap::new();
    for class in &model.classes {
        let class_covered = covered.get(class.id.0.as_str());
        for (subject, hours) in class.curriculum.iter().filter(|(_, h)| **h > 0) {
            if class_covered.is_some_and(|set| set.contains(subject)) {
                continue;
            }
            *subject_need.entry(subject).or_default() += hours;
        }
    }

    // Capacity per subject over the qualified pool.
    let mut subject_capacity: BTreeMap<&SubjectId, u32> = BTreeMap::new();
    for teacher in &model.teachers {
        for subject in &teacher.subjects {
            *subject_capacity.entry(subject).or_default() += teacher.deputat_max;
        }
    }

    // Aggregate deputat balance, both directions.
    let total_need = model.total_demand();
    let total_max: u32 = model.teachers.iter().map(|t| t.deputat_max).sum();
    let total_min: u32 = model.teachers.iter().map(|t| t.deputat_min).sum();
    if total_need == 0 {
        warnings.push("no curriculum hours defined; nothing to audit".into());
    } else if total_max < total_need {
        errors.push(format!(
            "aggregate deputat {total_max}h below total demand {total_need}h; \
             at least {}h of teaching capacity missing",
            total_need - total_max
        ));
    } else if (total_max as f64) < total_need as f64 * 1.05 {
        warnings.push(format!(
            "aggregate deputat {total_max}h leaves under 5% head-room over demand {total_need}h"
        ));
    }
    if total_min > total_need {
        errors.push(format!(
            "sum of deputat_min ({total_min}h) exceeds total demand ({total_need}h); \
             some teachers cannot reach their minimum"
        ));
    }

    // Per-teacher floor: enough open slots for the minimum load.
    for teacher in &model.teachers {
        let ceiling = if has_courses && teacher.can_teach_sek2 {
            model.time_grid.sek2_max_period
        } else {
            model.time_grid.sek1_max_period
        };
        let open = (0..model.time_grid.days_per_week)
            .flat_map(|d| {
                slots
                    .periods()
                    .iter()
                    .filter(move |p| **p <= ceiling)
                    .map(move |p| types::Slot::new(d, *p))
            })
            .filter(|s| !teacher.unavailable.contains(s))
            .count() as u32;
        if open < teacher.deputat_min {
            errors.push(format!(
                "teacher {}: only {open} open slots for a deputat minimum of {}h",
                teacher.id, teacher.deputat_min
            ));
        } else if open < teacher.deputat_max {
            warnings.push(format!(
                "teacher {}: deputat maximum {}h exceeds the {open} open slots",
                teacher.id, teacher.deputat_max
            ));
        }
    }

    // Free-day clustering makes the tail of the week hard to staff.
    let friday_wishes: Vec<&str> = model
        .teachers
        .iter()
        .filter(|t| t.preferred_free_days.contains(&4))
        .map(|t| t.id.0.as_str())
        .collect();
    if friday_wishes.len() >= 4 {
        warnings.push(format!(
            "{} teachers wish Friday free ({})",
            friday_wishes.len(),
            friday_wishes.join(", ")
        ));
    }

    // Per-subject capacity with a warning band at >= 95% utilisation.
    for (subject, &need) in &subject_need {
        let cap = subject_capacity.get(subject).copied().unwrap_or(0);
        if cap == 0 {
            errors.push(format!(
                "subject {subject}: no qualified teacher for {need}h/week"
            ));
        } else if cap < need {
            errors.push(format!(
                "subject {subject}: capacity {cap}h below demand {need}h ({}h short)",
                need - cap
            ));
        } else if need as f64 >= cap as f64 * 0.95 {
            warnings.push(format!(
                "subject {subject}: utilisation {need}h of {cap}h ({}%)",
                need * 100 / cap
            ));
        }
    }

    // Room-slot capacity per special room type.
    let double_blocks_per_day = model.time_grid.double_blocks.len() as u32;
    for room in &model.rooms {
        let mut need_hours = 0u32;
        let mut double_events = 0u32;
        let mut any_double_required = false;
        for subject in model
            .subjects
            .iter()
            .filter(|s| s.room_type.as_ref() == Some(&room.id))
        {
            for class in &model.classes {
                let hours = class.curriculum.get(&subject.id).copied().unwrap_or(0);
                need_hours += hours;
                if subject.double_required {
                    any_double_required = true;
                    double_events += hours / 2;
                }
            }
        }
        if need_hours == 0 {
            continue;
        }
        if room.capacity == 0 {
            errors.push(format!(
                "room type {}: needed for {need_hours}h/week but zero rooms configured",
                room.id
            ));
            continue;
        }
        if any_double_required {
            let max_events = room.capacity * double_blocks_per_day * days;
            if double_events > max_events {
                errors.push(format!(
                    "room type {}: {double_events} double-block events needed, only \
                     {max_events} available ({} rooms x {double_blocks_per_day} blocks x {days} days)",
                    room.id, room.capacity
                ));
            } else if max_events > 0 && double_events as f64 > max_events as f64 * 0.85 {
                warnings.push(format!(
                    "room type {}: double-block utilisation {double_events}/{max_events}",
                    room.id
                ));
            }
        }
        let max_hours = room.capacity * slots_per_week;
        if need_hours > max_hours {
            errors.push(format!(
                "room type {}: {need_hours}h/week needed, only {max_hours} room-slots available",
                room.id
            ));
        }
    }

    // Couplings need at least one qualified teacher per group.
    for coupling in &model.couplings {
        for group in &coupling.groups {
            let cap = subject_capacity.get(&group.subject).copied().unwrap_or(0);
            if cap == 0 {
                errors.push(format!(
                    "coupling {}, group '{}': no teacher qualified for {}",
                    coupling.id, group.label, group.subject
                ));
            }
        }
    }

    // Sek-II: every course subject needs a sek2-capable teacher pool.
    if has_courses {
        let mut sek2_need: BTreeMap<&SubjectId, u32> = BTreeMap::new();
        for class in model.classes.iter().filter(|c| c.is_course) {
            for (subject, hours) in class.curriculum.iter().filter(|(_, h)| **h > 0) {
                *sek2_need.entry(subject).or_default() += hours;
            }
        }
        let mut sek2_capacity: BTreeMap<&SubjectId, u32> = BTreeMap::new();
        for teacher in model.teachers.iter().filter(|t| t.can_teach_sek2) {
            for subject in &teacher.subjects {
                *sek2_capacity.entry(subject).or_default() += teacher.deputat_max;
            }
        }
        for (subject, &need) in &sek2_need {
            let cap = sek2_capacity.get(subject).copied().unwrap_or(0);
            if cap == 0 {
                errors.push(format!(
                    "Sek II: no sek2-capable teacher for {subject} ({need}h/week)"
                ));
            } else if cap < need {
                errors.push(format!(
                    "Sek II: only {cap}h sek2-capable capacity for {subject} at {need}h demand"
                ));
            }
        }
    }

    // Track hour totals must match their members' curricula.
    for track in &model.course_tracks {
        for course_id in &track.course_ids {
            if let Some(course) = model.class(course_id) {
                let total = course.total_weekly_hours();
                if total != track.hours_per_week {
                    warnings.push(format!(
                        "track {}: course {} has {total}h but the track runs {}h",
                        track.id, course_id, track.hours_per_week
                    ));
                }
            }
        }
    }

    // Subjects only reachable through couplings must not also demand direct
    // staffing that nobody can provide; surface them once for transparency.
    if !covered_anywhere.is_empty() {
        tracing::debug!(
            covered = covered_anywhere.len(),
            "subjects covered via couplings excluded from the direct capacity check"
        );
    }

    FeasibilityReport {
        feasible: errors.is_empty(),
        errors,
        warnings,
    }
}
