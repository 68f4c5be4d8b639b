//! Slot index: the bijection between `(day, period)` pairs and contiguous
//! integer indices, per-class period masks and contiguity runs.

use std::collections::HashMap;
use types::{SchoolClass, Slot, TimeGrid};

#[derive(Clone, Debug)]
pub struct SlotIndex {
    slots: Vec<Slot>,
    index: HashMap<Slot, usize>,
    /// All period numbers of the grid, ascending.
    periods: Vec<u8>,
    /// Periods available to Sek-I classes (ceiling applied, Sek-II-only
    /// periods removed).
    sek1_periods: Vec<u8>,
    /// Valid double-start periods within the Sek-I ceiling.
    double_starts: Vec<u8>,
    /// Contiguity runs over the full day sequence, split at pauses.
    runs: Vec<Vec<u8>>,
    days: u8,
}

impl SlotIndex {
    pub fn new(grid: &TimeGrid) -> Self {
        let periods: Vec<u8> = grid
            .lesson_slots
            .iter()
            .map(|s| s.period_number)
            .filter(|p| *p <= grid.sek2_max_period)
            .collect();
        let sek1_periods: Vec<u8> = grid
            .lesson_slots
            .iter()
            .filter(|s| !s.is_sek2_only && s.period_number <= grid.sek1_max_period)
            .map(|s| s.period_number)
            .collect();

        let mut slots = Vec::with_capacity(periods.len() * grid.days_per_week as usize);
        let mut index = HashMap::new();
        for day in 0..grid.days_per_week {
            for &p in &periods {
                let slot = Slot::new(day, p);
                index.insert(slot, slots.len());
                slots.push(slot);
            }
        }

        let double_starts: Vec<u8> = grid.double_starts();

        let runs = split_runs(&periods, grid);

        Self {
            slots,
            index,
            periods,
            sek1_periods,
            double_starts,
            runs,
            days: grid.days_per_week,
        }
    }

    pub fn days(&self) -> u8 {
        self.days
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn index_of(&self, slot: Slot) -> Option<usize> {
        self.index.get(&slot).copied()
    }

    pub fn day_of(&self, idx: usize) -> u8 {
        self.slots[idx].day
    }

    /// All period numbers of the grid, ascending.
    pub fn periods(&self) -> &[u8] {
        &self.periods
    }

    /// The class-local period sequence: periods up to the class ceiling,
    /// with Sek-II-only periods admitted only for course lanes.
    pub fn class_periods(&self, class: &SchoolClass) -> Vec<u8> {
        if class.is_course {
            self.periods
                .iter()
                .copied()
                .filter(|p| *p <= class.max_period)
                .collect()
        } else {
            self.sek1_periods
                .iter()
                .copied()
                .filter(|p| *p <= class.max_period)
                .collect()
        }
    }

    pub fn admissible(&self, class: &SchoolClass, slot: Slot) -> bool {
        slot.day < self.days && self.class_periods(class).contains(&slot.period)
    }

    /// Double-start periods valid for this class (both halves admissible).
    pub fn class_double_starts(&self, class: &SchoolClass) -> Vec<u8> {
        let periods = self.class_periods(class);
        self.double_starts
            .iter()
            .copied()
            .filter(|p| periods.contains(p) && periods.contains(&(p + 1)))
            .collect()
    }

    pub fn is_double_start(&self, period: u8) -> bool {
        self.double_starts.contains(&period)
    }

    /// The next active period on the same day, or None at the day's end.
    pub fn next_in_day(&self, slot: Slot) -> Option<Slot> {
        let pos = self.periods.iter().position(|p| *p == slot.period)?;
        self.periods
            .get(pos + 1)
            .map(|p| Slot::new(slot.day, *p))
    }

    /// Contiguity runs of the full day sequence (identical on every day).
    pub fn runs(&self) -> &[Vec<u8>] {
        &self.runs
    }

    /// Splits an ascending period subset into contiguity runs, breaking
    /// wherever a pause (or a hole in the raster) separates two entries.
    pub fn runs_for(&self, periods: &[u8], grid: &TimeGrid) -> Vec<Vec<u8>> {
        split_runs(periods, grid)
    }
}

fn split_runs(periods: &[u8], grid: &TimeGrid) -> Vec<Vec<u8>> {
    let mut runs: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    for &p in periods {
        if let Some(&prev) = current.last() {
            let pause_between = (prev..p).any(|q| grid.pause_after(q));
            if pause_between {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(p);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::CourseType;

    fn sek1_class(max_period: u8) -> SchoolClass {
        SchoolClass {
            id: "7c".into(),
            grade: 7,
            label: "c".into(),
            curriculum: Default::default(),
            max_period,
            is_course: false,
            course_type: CourseType::None,
        }
    }

    #[test]
    fn default_grid_runs_split_at_pauses() {
        let grid = TimeGrid::default_gymnasium();
        let idx = SlotIndex::new(&grid);
        let runs: Vec<Vec<u8>> = idx.runs().to_vec();
        assert_eq!(
            runs,
            vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8, 9, 10]]
        );
    }

    #[test]
    fn bijection_covers_every_day_period_pair() {
        let grid = TimeGrid::default_gymnasium();
        let idx = SlotIndex::new(&grid);
        assert_eq!(idx.slots().len(), 5 * 10);
        for (i, slot) in idx.slots().iter().enumerate() {
            assert_eq!(idx.index_of(*slot), Some(i));
            assert_eq!(idx.day_of(i), slot.day);
        }
        assert_eq!(idx.index_of(Slot::new(0, 11)), None);
    }

    #[test]
    fn class_mask_respects_ceiling_and_sek2_flag() {
        let grid = TimeGrid::default_gymnasium();
        let idx = SlotIndex::new(&grid);
        assert_eq!(idx.class_periods(&sek1_class(7)), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(idx.class_periods(&sek1_class(6)), vec![1, 2, 3, 4, 5, 6]);

        let mut course = sek1_class(10);
        course.is_course = true;
        assert_eq!(idx.class_periods(&course).len(), 10);
        assert!(idx.admissible(&course, Slot::new(0, 9)));
        assert!(!idx.admissible(&sek1_class(7), Slot::new(0, 9)));
    }

    #[test]
    fn double_starts_need_both_halves() {
        let grid = TimeGrid::default_gymnasium();
        let idx = SlotIndex::new(&grid);
        assert_eq!(idx.class_double_starts(&sek1_class(7)), vec![1, 3, 5]);
        // Ceiling 5 cuts the 5-6 block.
        assert_eq!(idx.class_double_starts(&sek1_class(5)), vec![1, 3]);
        assert!(idx.is_double_start(3));
        assert!(!idx.is_double_start(2));
    }

    #[test]
    fn next_in_day_walks_the_sequence() {
        let grid = TimeGrid::default_gymnasium();
        let idx = SlotIndex::new(&grid);
        assert_eq!(idx.next_in_day(Slot::new(2, 2)), Some(Slot::new(2, 3)));
        assert_eq!(idx.next_in_day(Slot::new(2, 10)), None);
    }
}
