//! Recomputes the soft objective terms on a decoded schedule.
//!
//! Used by quality reports and by tests that compare a re-solve against a
//! stored solution; the model builder has its own (equivalent) encoding.

use crate::slots::SlotIndex;
use itertools::Itertools;
use std::collections::{BTreeMap, HashSet};
use types::{DomainModel, ScheduleEntry, SubjectId};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoftScores {
    /// Free periods strictly between two occupied periods, per teacher-day.
    pub gaps: i64,
    /// Per-day gap units beyond the first.
    pub gap_excess: i64,
    /// Sum over teachers of (max daily hours - min daily hours).
    pub workload_spread: i64,
    /// Preferred-free days that ended up with lessons.
    pub day_wish_hits: i64,
    /// Occupied edge periods (first period, last Sek-I period).
    pub edge_periods: i64,
    /// Realised optional double periods (reward).
    pub optional_doubles: i64,
    /// Hauptfach hours beyond one per class-day, doubles excepted.
    pub spread_excess: i64,
    /// Sum over teachers of |hours - deputat|.
    pub deputat_deviation: i64,
    pub objective: f64,
}

/// Median weekly gap count over all teachers; quality reports quote this.
pub fn median_teacher_gaps(model: &DomainModel, entries: &[ScheduleEntry]) -> i64 {
    let slots = SlotIndex::new(&model.time_grid);
    let mut busy: HashSet<(&str, u8, u8)> = HashSet::new();
    for e in entries {
        busy.insert((e.teacher.0.as_str(), e.day, e.period));
    }
    let mut per_teacher: Vec<i64> = Vec::with_capacity(model.teachers.len());
    for teacher in &model.teachers {
        let tid = teacher.id.0.as_str();
        let mut gaps = 0i64;
        for day in 0..model.time_grid.days_per_week {
            let usable: Vec<u8> = slots
                .periods()
                .iter()
                .copied()
                .filter(|p| !teacher.unavailable.contains(&types::Slot::new(day, *p)))
                .collect();
            let positions: Vec<usize> = usable
                .iter()
                .enumerate()
                .filter(|(_, p)| busy.contains(&(tid, day, **p)))
                .map(|(i, _)| i)
                .collect();
            if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
                gaps += (last - first + 1) as i64 - positions.len() as i64;
            }
        }
        per_teacher.push(gaps);
    }
    per_teacher.sort_unstable();
    per_teacher.get(per_teacher.len() / 2).copied().unwrap_or(0)
}

pub fn soft_scores(model: &DomainModel, entries: &[ScheduleEntry]) -> SoftScores {
    let slots = SlotIndex::new(&model.time_grid);
    let days = model.time_grid.days_per_week;

    // Occupied (teacher, day, period); coupling lessons occupy the teacher
    // once regardless of how many classes the entry fans out to.
    let mut teacher_busy: HashSet<(&str, u8, u8)> = HashSet::new();
    for e in entries {
        teacher_busy.insert((e.teacher.0.as_str(), e.day, e.period));
    }

    let mut gaps = 0i64;
    let mut gap_excess = 0i64;
    let mut workload_spread = 0i64;
    let mut day_wish_hits = 0i64;
    let mut edge_periods = 0i64;
    let mut deputat_deviation = 0i64;

    let first_period = slots.periods().first().copied().unwrap_or(1);
    let last_edge = model.time_grid.sek1_max_period;

    for teacher in &model.teachers {
        let tid = teacher.id.0.as_str();
        let mut day_hours: Vec<i64> = Vec::with_capacity(days as usize);
        let mut total = 0i64;
        for day in 0..days {
            // Unavailable periods fall out of the gap window; a free period
            // the teacher could not have taught in is not a gap.
            let usable: Vec<u8> = slots
                .periods()
                .iter()
                .copied()
                .filter(|p| !teacher.unavailable.contains(&types::Slot::new(day, *p)))
                .collect();
            let positions: Vec<usize> = usable
                .iter()
                .enumerate()
                .filter(|(_, p)| teacher_busy.contains(&(tid, day, **p)))
                .map(|(i, _)| i)
                .collect();
            let hours = positions.len() as i64;
            day_hours.push(hours);
            total += hours;
            if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
                let day_gaps = (last - first + 1) as i64 - hours;
                gaps += day_gaps;
                gap_excess += (day_gaps - 1).max(0);
            }
            if teacher_busy.contains(&(tid, day, first_period)) {
                edge_periods += 1;
            }
            if teacher_busy.contains(&(tid, day, last_edge)) {
                edge_periods += 1;
            }
        }
        if total > 0 {
            let max = day_hours.iter().copied().max().unwrap_or(0);
            let min = day_hours.iter().copied().min().unwrap_or(0);
            workload_spread += max - min;
        }
        for day in &teacher.preferred_free_days {
            if day_hours.get(*day as usize).copied().unwrap_or(0) > 0 {
                day_wish_hits += 1;
            }
        }
        deputat_deviation += (total - teacher.deputat as i64).abs();
    }

    // Doubles per (class, subject, day): adjacent pairs on a valid block
    // start, taken from the non-coupling entries.
    let by_tcsd = entries
        .iter()
        .filter(|e| e.coupling.is_none())
        .map(|e| {
            (
                (
                    e.teacher.0.as_str(),
                    e.class.0.as_str(),
                    e.subject.0.as_str(),
                    e.day,
                ),
                e.period,
            )
        })
        .into_group_map();

    let mut doubles_by_csd: BTreeMap<(&str, &str, u8), i64> = BTreeMap::new();
    let mut optional_doubles = 0i64;
    for (&(_, class, subject, day), periods) in &by_tcsd {
        let set: HashSet<u8> = periods.iter().copied().collect();
        let mut pairs = 0i64;
        for p in periods {
            if slots.is_double_start(*p) && set.contains(&(p + 1)) {
                pairs += 1;
            }
        }
        if pairs > 0 {
            *doubles_by_csd.entry((class, subject, day)).or_default() += pairs;
            if let Some(meta) = model.subject(&SubjectId::from(subject)) {
                if meta.double_preferred && !meta.double_required {
                    optional_doubles += pairs;
                }
            }
        }
    }

    let mut spread_excess = 0i64;
    let mut hours_by_csd: BTreeMap<(&str, &str, u8), i64> = BTreeMap::new();
    for (&(_, class, subject, day), periods) in &by_tcsd {
        *hours_by_csd.entry((class, subject, day)).or_default() += periods.len() as i64;
    }
    for (&(class, subject, day), count) in &hours_by_csd {
        match model.subject(&SubjectId::from(subject)) {
            Some(m) if m.is_hauptfach => {}
            _ => continue,
        }
        let doubles = doubles_by_csd
            .get(&(class, subject, day))
            .copied()
            .unwrap_or(0);
        spread_excess += (count - 1 - doubles).max(0);
    }

    let w = &model.weights;
    let objective = w.gaps as f64 * (gaps + gap_excess) as f64
        + w.workload as f64 * workload_spread as f64
        + w.day_wishes as f64 * day_wish_hits as f64
        + w.compact as f64 * edge_periods as f64
        - w.double_lessons as f64 * optional_doubles as f64
        + w.subject_spread as f64 * spread_excess as f64
        + w.deputat_dev as f64 * deputat_deviation as f64;

    SoftScores {
        gaps,
        gap_excess,
        workload_spread,
        day_wish_hits,
        edge_periods,
        optional_doubles,
        spread_excess,
        deputat_deviation,
        objective,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::tiny_model;

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

    #[test]
    fn gap_between_two_lessons_is_counted() {
        let model = tiny_model();
        // MUL teaches periods 1 and 3; period 2 is a gap.
        let entries = vec![entry(0, 1, "MUL", "5a", "Ma"), entry(0, 3, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.gaps, 1);
        assert_eq!(scores.gap_excess, 0);
    }

    #[test]
    fn two_gaps_trigger_the_excess_term() {
        let model = tiny_model();
        let entries = vec![entry(0, 1, "MUL", "5a", "Ma"), entry(0, 4, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.gaps, 2);
        assert_eq!(scores.gap_excess, 1);
    }

    #[test]
    fn day_wish_hit_and_edge_periods() {
        let mut model = tiny_model();
        model.teachers[0].preferred_free_days = vec![0];
        let entries = vec![entry(0, 1, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.day_wish_hits, 1);
        assert_eq!(scores.edge_periods, 1);
    }

    #[test]
    fn adjacent_hauptfach_pair_counts_as_double_not_spread() {
        let model = tiny_model();
        let entries = vec![entry(0, 3, "MUL", "5a", "Ma"), entry(0, 4, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.optional_doubles, 1);
        assert_eq!(scores.spread_excess, 0);
    }

    #[test]
    fn two_separate_hours_on_one_day_are_spread_excess() {
        let model = tiny_model();
        let entries = vec![entry(0, 1, "MUL", "5a", "Ma"), entry(0, 3, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.optional_doubles, 0);
        assert_eq!(scores.spread_excess, 1);
    }

    #[test]
    fn deputat_deviation_measures_distance_to_target() {
        let model = tiny_model(); // MUL target 10h, SCH target 10h
        let entries = vec![entry(0, 1, "MUL", "5a", "Ma")];
        let scores = soft_scores(&model, &entries);
        assert_eq!(scores.deputat_deviation, 9 + 10);
    }
}
