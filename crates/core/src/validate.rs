//! Post-solve validation: re-checks every invariant on the decoded
//! solution by plain aggregation over the entries.
//!
//! Deliberately independent of the model builder; a disagreement between
//! the two is an internal error in the solver, not in the data.

use crate::audit::coupling_covered_subjects;
use crate::slots::SlotIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use types::{DomainModel, ScheduleEntry, Slot, Solution};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug)]
pub struct Violation {
    pub severity: Severity,
    pub constraint: &'static str,
    pub entity: String,
    pub description: String,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self
            .violations
            .iter()
            .any(|v| v.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }
}

#[derive(Default)]
pub struct SolutionValidator;

impl SolutionValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, solution: &Solution, model: &DomainModel) -> ValidationReport {
        let slots = SlotIndex::new(&model.time_grid);
        let mut v: Vec<Violation> = Vec::new();

        self.check_teacher_double_booking(&solution.entries, &mut v);
        self.check_class_double_booking(&solution.entries, &mut v);
        self.check_room_double_booking(&solution.entries, &mut v);
        self.check_admissible_slots(&solution.entries, model, &slots, &mut v);
        self.check_curriculum(&solution.entries, model, &mut v);
        self.check_deputat(&solution.entries, model, &mut v);
        self.check_availability(&solution.entries, model, &mut v);
        self.check_teacher_daily_limits(&solution.entries, model, &slots, &mut v);
        self.check_prefix_compactness(&solution.entries, model, &slots, &mut v);
        self.check_doubles(&solution.entries, model, &slots, &mut v);
        self.check_couplings(&solution.entries, model, &mut v);
        self.check_track_sync(&solution.entries, model, &mut v);
        self.check_pins(&solution.entries, model, &mut v);

        ValidationReport { violations: v }
    }

    fn check_teacher_double_booking(&self, entries: &[ScheduleEntry], out: &mut Vec<Violation>) {
        let mut seen: BTreeMap<(&str, u8, u8), Vec<&str>> = BTreeMap::new();
        let mut coupling_seen: HashSet<(&str, u8, u8, &str)> = HashSet::new();
        for e in entries {
            if let Some(k) = &e.coupling {
                // One coupling lesson fans out to many classes; the teacher
                // is there only once.
                if !coupling_seen.insert((e.teacher.0.as_str(), e.day, e.period, k.0.as_str())) {
                    continue;
                }
            }
            seen.entry((e.teacher.0.as_str(), e.day, e.period))
                .or_default()
                .push(e.class.0.as_str());
        }
        for ((teacher, day, period), classes) in seen {
            if classes.len() > 1 {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "teacher_double_booking",
                    entity: teacher.to_string(),
                    description: format!(
                        "{}: booked in {} at once",
                        Slot::new(day, period),
                        classes.join(", ")
                    ),
                });
            }
        }
    }

    fn check_class_double_booking(&self, entries: &[ScheduleEntry], out: &mut Vec<Violation>) {
        let mut by_slot: BTreeMap<(&str, u8, u8), Vec<&ScheduleEntry>> = BTreeMap::new();
        for e in entries {
            by_slot
                .entry((e.class.0.as_str(), e.day, e.period))
                .or_default()
                .push(e);
        }
        for ((class, day, period), group) in by_slot {
            if group.len() <= 1 {
                continue;
            }
            // Several entries per class-slot are fine iff they all belong
            // to the same coupling (the class is split across groups).
            let first = group[0].coupling.as_ref();
            let same_coupling =
                first.is_some() && group.iter().all(|e| e.coupling.as_ref() == first);
            if !same_coupling {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "class_double_booking",
                    entity: class.to_string(),
                    description: format!(
                        "{}: {} simultaneous lessons without a shared coupling",
                        Slot::new(day, period),
                        group.len()
                    ),
                });
            }
        }
    }

    fn check_room_double_booking(&self, entries: &[ScheduleEntry], out: &mut Vec<Violation>) {
        let mut seen: BTreeMap<(&str, u8, u8), Vec<&str>> = BTreeMap::new();
        let mut coupling_seen: HashSet<(&str, u8, u8, &str)> = HashSet::new();
        for e in entries {
            let Some(room) = e.room.as_deref() else {
                continue;
            };
            if let Some(k) = &e.coupling {
                if !coupling_seen.insert((room, e.day, e.period, k.0.as_str())) {
                    continue;
                }
            }
            seen.entry((room, e.day, e.period))
                .or_default()
                .push(e.class.0.as_str());
        }
        for ((room, day, period), classes) in seen {
            if classes.len() > 1 {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "room_double_booking",
                    entity: room.to_string(),
                    description: format!(
                        "{}: occupied by {} at once",
                        Slot::new(day, period),
                        classes.join(", ")
                    ),
                });
            }
        }
    }

    fn check_admissible_slots(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        slots: &SlotIndex,
        out: &mut Vec<Violation>,
    ) {
        for e in entries {
            let Some(class) = model.class(&e.class) else {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "unknown_entity",
                    entity: e.class.0.clone(),
                    description: "entry references an unknown class".into(),
                });
                continue;
            };
            if !slots.admissible(class, Slot::new(e.day, e.period)) {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "inadmissible_slot",
                    entity: e.class.0.clone(),
                    description: format!(
                        "{} is outside the raster of {}",
                        Slot::new(e.day, e.period),
                        e.class
                    ),
                });
            }
        }
    }

    fn check_curriculum(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        let covered = coupling_covered_subjects(model);
        let mut actual: BTreeMap<(&str, &str), i64> = BTreeMap::new();
        for e in entries.iter().filter(|e| e.coupling.is_none()) {
            *actual
                .entry((e.class.0.as_str(), e.subject.0.as_str()))
                .or_default() += 1;
        }
        for class in &model.classes {
            let class_covered = covered.get(class.id.0.as_str());
            for (subject, hours) in class.curriculum.iter().filter(|(_, h)| **h > 0) {
                if class_covered.is_some_and(|set| set.contains(subject)) {
                    continue; // satisfied through the coupling, checked there
                }
                let got = actual
                    .get(&(class.id.0.as_str(), subject.0.as_str()))
                    .copied()
                    .unwrap_or(0);
                if got != *hours as i64 {
                    let severity = if (got - *hours as i64).abs() > 1 {
                        Severity::Error
                    } else {
                        Severity::Warning
                    };
                    out.push(Violation {
                        severity,
                        constraint: "curriculum_mismatch",
                        entity: class.id.0.clone(),
                        description: format!("{subject}: planned {hours}h, scheduled {got}h"),
                    });
                }
            }
        }
    }

    fn check_deputat(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        let mut busy: HashSet<(&str, u8, u8)> = HashSet::new();
        for e in entries {
            busy.insert((e.teacher.0.as_str(), e.day, e.period));
        }
        for teacher in &model.teachers {
            let actual = busy
                .iter()
                .filter(|(t, _, _)| *t == teacher.id.0.as_str())
                .count() as u32;
            if actual > teacher.deputat_max {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "deputat_exceeded",
                    entity: teacher.id.0.clone(),
                    description: format!(
                        "{actual}h exceed the maximum of {}h",
                        teacher.deputat_max
                    ),
                });
            } else if actual < teacher.deputat_min {
                out.push(Violation {
                    severity: Severity::Warning,
                    constraint: "deputat_underrun",
                    entity: teacher.id.0.clone(),
                    description: format!(
                        "{actual}h below the minimum of {}h",
                        teacher.deputat_min
                    ),
                });
            }
        }
    }

    fn check_availability(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        let unavailable: HashMap<&str, &[Slot]> = model
            .teachers
            .iter()
            .map(|t| (t.id.0.as_str(), t.unavailable.as_slice()))
            .collect();
        for e in entries {
            let Some(blocked) = unavailable.get(e.teacher.0.as_str()) else {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "unknown_entity",
                    entity: e.teacher.0.clone(),
                    description: "entry references an unknown teacher".into(),
                });
                continue;
            };
            if blocked.contains(&Slot::new(e.day, e.period)) {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "unavailable_slot",
                    entity: e.teacher.0.clone(),
                    description: format!(
                        "{} is blocked, but {} for {} is scheduled there",
                        Slot::new(e.day, e.period),
                        e.subject,
                        e.class
                    ),
                });
            }
        }
    }

    /// Daily-hours and gap caps on the decoded entries. A free period only counts as a
    /// gap when the teacher could actually have taught there; unavailable
    /// periods fall out of the window.
    fn check_teacher_daily_limits(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        slots: &SlotIndex,
        out: &mut Vec<Violation>,
    ) {
        let mut busy: HashSet<(&str, u8, u8)> = HashSet::new();
        for e in entries {
            busy.insert((e.teacher.0.as_str(), e.day, e.period));
        }
        for teacher in &model.teachers {
            let tid = teacher.id.0.as_str();
            let mut week_gaps = 0u32;
            for day in 0..model.time_grid.days_per_week {
                let usable: Vec<u8> = slots
                    .periods()
                    .iter()
                    .copied()
                    .filter(|p| !teacher.unavailable.contains(&Slot::new(day, *p)))
                    .collect();
                let positions: Vec<usize> = usable
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| busy.contains(&(tid, day, **p)))
                    .map(|(i, _)| i)
                    .collect();
                let hours = positions.len() as u32;
                if hours > teacher.max_hours_per_day {
                    out.push(Violation {
                        severity: Severity::Error,
                        constraint: "max_hours_per_day",
                        entity: teacher.id.0.clone(),
                        description: format!(
                            "day {}: {hours}h exceed the daily maximum of {}h",
                            day + 1,
                            teacher.max_hours_per_day
                        ),
                    });
                }
                if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
                    let gaps = (last - first + 1) as u32 - hours;
                    week_gaps += gaps;
                    if gaps > teacher.max_gaps_per_day {
                        out.push(Violation {
                            severity: Severity::Error,
                            constraint: "max_gaps_per_day",
                            entity: teacher.id.0.clone(),
                            description: format!(
                                "day {}: {gaps} gaps exceed the daily maximum of {}",
                                day + 1,
                                teacher.max_gaps_per_day
                            ),
                        });
                    }
                }
            }
            if teacher.max_gaps_per_week > 0 && week_gaps > teacher.max_gaps_per_week {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "max_gaps_per_week",
                    entity: teacher.id.0.clone(),
                    description: format!(
                        "{week_gaps} weekly gaps exceed the maximum of {}",
                        teacher.max_gaps_per_week
                    ),
                });
            }
        }
    }

    fn check_prefix_compactness(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        slots: &SlotIndex,
        out: &mut Vec<Violation>,
    ) {
        for class in model.classes.iter().filter(|c| !c.is_course) {
            let day_sequence = slots.class_periods(class);
            for day in 0..model.time_grid.days_per_week {
                let active: BTreeSet<u8> = entries
                    .iter()
                    .filter(|e| e.class == class.id && e.day == day)
                    .map(|e| e.period)
                    .collect();
                if active.is_empty() {
                    continue;
                }
                let prefix_len = active.len();
                let expected: BTreeSet<u8> =
                    day_sequence.iter().copied().take(prefix_len).collect();
                if active != expected {
                    out.push(Violation {
                        severity: Severity::Error,
                        constraint: "class_not_compact",
                        entity: class.id.0.clone(),
                        description: format!(
                            "day {}: active periods {:?} are not a prefix of the day",
                            day + 1,
                            active
                        ),
                    });
                }
            }
        }
    }

    fn check_doubles(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        slots: &SlotIndex,
        out: &mut Vec<Violation>,
    ) {
        for class in &model.classes {
            for (subject_id, &hours) in class.curriculum.iter().filter(|(_, h)| **h > 0) {
                let Some(subject) = model.subject(subject_id) else {
                    continue;
                };
                if !subject.double_required {
                    continue;
                }
                let mut by_day: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();
                for e in entries
                    .iter()
                    .filter(|e| e.class == class.id && &e.subject == subject_id)
                {
                    by_day.entry(e.day).or_default().insert(e.period);
                }
                let mut pairs = 0u32;
                let mut singleton_days: Vec<u8> = Vec::new();
                let mut double_days: Vec<u8> = Vec::new();
                for (day, periods) in &by_day {
                    let mut day_pairs = 0u32;
                    for p in periods {
                        if slots.is_double_start(*p) && periods.contains(&(p + 1)) {
                            day_pairs += 1;
                        }
                    }
                    pairs += day_pairs;
                    if day_pairs > 0 {
                        double_days.push(*day);
                    }
                    let leftover = (periods.len() as u32).saturating_sub(2 * day_pairs);
                    for _ in 0..leftover {
                        singleton_days.push(*day);
                    }
                }
                let expected_pairs = hours / 2;
                if pairs != expected_pairs {
                    out.push(Violation {
                        severity: Severity::Error,
                        constraint: "double_count",
                        entity: class.id.0.clone(),
                        description: format!(
                            "{subject_id}: {pairs} double blocks scheduled, {expected_pairs} required"
                        ),
                    });
                }
                let expected_singles = hours % 2;
                if singleton_days.len() as u32 != expected_singles {
                    out.push(Violation {
                        severity: Severity::Error,
                        constraint: "double_singleton",
                        entity: class.id.0.clone(),
                        description: format!(
                            "{subject_id}: {} stray single hours, {expected_singles} allowed",
                            singleton_days.len()
                        ),
                    });
                } else if expected_singles == 1 {
                    if let Some(day) = singleton_days.first() {
                        if double_days.contains(day) {
                            out.push(Violation {
                                severity: Severity::Error,
                                constraint: "double_singleton",
                                entity: class.id.0.clone(),
                                description: format!(
                                    "{subject_id}: the single hour shares day {} with a double",
                                    day + 1
                                ),
                            });
                        }
                    }
                }
                if hours == 1 {
                    out.push(Violation {
                        severity: Severity::Warning,
                        constraint: "double_single_hour",
                        entity: class.id.0.clone(),
                        description: format!(
                            "{subject_id}: double periods required but only one weekly hour"
                        ),
                    });
                }
            }
        }
    }

    fn check_couplings(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        for coupling in &model.couplings {
            let mut class_slots: BTreeMap<&str, BTreeSet<(u8, u8)>> = BTreeMap::new();
            for e in entries {
                if e.coupling.as_ref() == Some(&coupling.id) {
                    class_slots
                        .entry(e.class.0.as_str())
                        .or_default()
                        .insert((e.day, e.period));
                }
            }
            if class_slots.is_empty() {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "coupling_missing",
                    entity: coupling.id.0.clone(),
                    description: "no entries scheduled for this coupling".into(),
                });
                continue;
            }
            let reference = class_slots.values().next().cloned().unwrap_or_default();
            if reference.len() as u32 != coupling.hours_per_week {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "coupling_hours",
                    entity: coupling.id.0.clone(),
                    description: format!(
                        "{} slots scheduled, {} required",
                        reference.len(),
                        coupling.hours_per_week
                    ),
                });
            }
            for involved in &coupling.involved_classes {
                match class_slots.get(involved.0.as_str()) {
                    Some(set) if *set == reference => {}
                    Some(_) => out.push(Violation {
                        severity: Severity::Error,
                        constraint: "coupling_inconsistent",
                        entity: coupling.id.0.clone(),
                        description: format!("{involved} deviates from the shared slots"),
                    }),
                    None => out.push(Violation {
                        severity: Severity::Error,
                        constraint: "coupling_inconsistent",
                        entity: coupling.id.0.clone(),
                        description: format!("{involved} has no entries for this coupling"),
                    }),
                }
            }
            // Group teachers must be qualified for their group's subject.
            let mut teachers_by_subject: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            for e in entries {
                if e.coupling.as_ref() == Some(&coupling.id) {
                    teachers_by_subject
                        .entry(e.subject.0.as_str())
                        .or_default()
                        .insert(e.teacher.0.as_str());
                }
            }
            for group in &coupling.groups {
                let Some(teachers) = teachers_by_subject.get(group.subject.0.as_str()) else {
                    continue;
                };
                for tid in teachers {
                    let qualified = model
                        .teacher(&(*tid).into())
                        .is_some_and(|t| t.is_qualified(&group.subject));
                    if !qualified {
                        out.push(Violation {
                            severity: Severity::Error,
                            constraint: "coupling_teacher_unqualified",
                            entity: (*tid).to_string(),
                            description: format!(
                                "leads group '{}' without qualification for {}",
                                group.label, group.subject
                            ),
                        });
                    }
                }
            }
        }
    }

    fn check_track_sync(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        for track in &model.course_tracks {
            let mut per_course: Vec<(&str, BTreeSet<(u8, u8)>)> = Vec::new();
            for course in &track.course_ids {
                let set: BTreeSet<(u8, u8)> = entries
                    .iter()
                    .filter(|e| e.class == *course)
                    .map(|e| (e.day, e.period))
                    .collect();
                per_course.push((course.0.as_str(), set));
            }
            let Some((_, reference)) = per_course.first() else {
                continue;
            };
            let reference = reference.clone();
            for (course, set) in &per_course[1..] {
                if *set != reference {
                    out.push(Violation {
                        severity: Severity::Error,
                        constraint: "track_out_of_sync",
                        entity: track.id.0.clone(),
                        description: format!("course {course} deviates from the track slots"),
                    });
                }
            }
        }
    }

    fn check_pins(
        &self,
        entries: &[ScheduleEntry],
        model: &DomainModel,
        out: &mut Vec<Violation>,
    ) {
        for pin in &model.pins {
            let found = entries.iter().any(|e| {
                e.teacher == pin.teacher
                    && e.class == pin.class
                    && e.subject == pin.subject
                    && e.day == pin.slot.day
                    && e.period == pin.slot.period
            });
            if !found {
                out.push(Violation {
                    severity: Severity::Error,
                    constraint: "pin_missing",
                    entity: pin.teacher.0.clone(),
                    description: format!(
                        "pinned lesson {} {} {} at {} is absent",
                        pin.teacher, pin.class, pin.subject, pin.slot
                    ),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::tiny_model;
    use types::{ConfigSnapshot, SoftWeights, SolveStatus};

    fn entry(day: u8, period: u8, teacher: &str, class: &str, subject: &str) -> ScheduleEntry {
        ScheduleEntry {
            day,
            period,
            teacher: teacher.into(),
            class: class.into(),
            subject: subject.into(),
            room: None,
            coupling: None,
        }
    }

    fn wrap(entries: Vec<ScheduleEntry>) -> Solution {
        Solution {
            status: SolveStatus::Feasible,
            entries,
            assignments: vec![],
            objective_value: None,
            num_variables: 0,
            num_constraints: 0,
            solve_time_seconds: 0.0,
            config_snapshot: ConfigSnapshot {
                time_limit_seconds: 60,
                num_workers: 1,
                seed: 0,
                use_soft: false,
                two_pass: false,
                weights: SoftWeights::zero(),
            },
        }
    }

    /// A hand-built compact timetable for the two-subject mini school.
    fn good_entries() -> Vec<ScheduleEntry> {
        let mut entries = Vec::new();
        // Ma periods 1-2 Mon/Tue, De periods 1-2 Wed/Thu for 5a.
        for (day, subject, teacher) in
            [(0, "Ma", "MUL"), (1, "Ma", "MUL"), (2, "De", "SCH"), (3, "De", "SCH")]
        {
            entries.push(entry(day, 1, teacher, "5a", subject));
            entries.push(entry(day, 2, teacher, "5a", subject));
        }
        entries
    }

    #[test]
    fn clean_solution_passes() {
        let model = tiny_model();
        let report = SolutionValidator::new().validate(&wrap(good_entries()), &model);
        assert!(report.is_valid(), "{:?}", report.violations);
    }

    #[test]
    fn teacher_double_booking_is_flagged() {
        let mut model = tiny_model();
        model.classes.push(crate::tests::class("5b", 5, &[("Ma", 4)]));
        let mut entries = good_entries();
        entries.push(entry(0, 1, "MUL", "5b", "Ma"));
        let report = SolutionValidator::new().validate(&wrap(entries), &model);
        assert!(report
            .errors()
            .any(|v| v.constraint == "teacher_double_booking"));
    }

    #[test]
    fn curriculum_shortfall_is_flagged() {
        let model = tiny_model();
        let mut entries = good_entries();
        entries.retain(|e| !(e.subject.0 == "De" && e.day == 3));
        let report = SolutionValidator::new().validate(&wrap(entries), &model);
        assert!(report
            .violations
            .iter()
            .any(|v| v.constraint == "curriculum_mismatch"));
    }

    #[test]
    fn non_prefix_day_is_flagged() {
        let model = tiny_model();
        let mut entries = good_entries();
        // Move one Monday lesson from period 2 to period 4: hole at 2-3.
        entries
            .iter_mut()
            .find(|e| e.day == 0 && e.period == 2)
            .unwrap()
            .period = 4;
        let report = SolutionValidator::new().validate(&wrap(entries), &model);
        assert!(report.errors().any(|v| v.constraint == "class_not_compact"));
    }

    #[test]
    fn unavailable_slot_is_flagged() {
        let mut model = tiny_model();
        model.teachers[0].unavailable = vec![Slot::new(0, 1)];
        let report = SolutionValidator::new().validate(&wrap(good_entries()), &model);
        assert!(report.errors().any(|v| v.constraint == "unavailable_slot"));
    }

    #[test]
    fn sek2_only_period_rejected_for_sek1_class() {
        let model = tiny_model();
        let mut entries = good_entries();
        entries.push(entry(4, 9, "MUL", "5a", "Ma"));
        let report = SolutionValidator::new().validate(&wrap(entries), &model);
        assert!(report.errors().any(|v| v.constraint == "inadmissible_slot"));
    }

    #[test]
    fn missing_pin_is_flagged() {
        let mut model = tiny_model();
        model.pins.push(types::Pin {
            teacher: "MUL".into(),
            class: "5a".into(),
            subject: "Ma".into(),
            slot: Slot::new(4, 1),
        });
        let report = SolutionValidator::new().validate(&wrap(good_entries()), &model);
        assert!(report.errors().any(|v| v.constraint == "pin_missing"));
    }

    #[test]
    fn double_required_counts_are_checked() {
        let mut model = tiny_model();
        // Physik 3h, doubles required.
        model.subjects.push(types::Subject {
            id: "Ph".into(),
            name: "Physik".into(),
            short: "Ph".into(),
            category: types::SubjectCategory::Nw,
            room_type: None,
            double_required: true,
            double_preferred: false,
            is_hauptfach: false,
        });
        model.classes[0].curriculum.insert("Ph".into(), 3);
        model.teachers.push(crate::tests::teacher("PHY", &["Ph"], 10));

        let mut entries = good_entries();
        // One proper double Mon 3-4 (after the Ma block), singleton on Tue 3.
        entries.push(entry(0, 3, "PHY", "5a", "Ph"));
        entries.push(entry(0, 4, "PHY", "5a", "Ph"));
        entries.push(entry(1, 3, "PHY", "5a", "Ph"));
        let report = SolutionValidator::new().validate(&wrap(entries.clone()), &model);
        assert!(
            !report
                .violations
                .iter()
                .any(|x| x.constraint.starts_with("double_")),
            "{:?}",
            report.violations
        );

        // Singleton on the same day as the double: rejected.
        entries.last_mut().unwrap().day = 0;
        entries.last_mut().unwrap().period = 5;
        let report = SolutionValidator::new().validate(&wrap(entries), &model);
        assert!(report.errors().any(|v| v.constraint == "double_singleton"));
    }
}
