//! The weekly time raster: lesson periods, pauses, double-period blocks.

use serde::{Deserialize, Serialize};

/// A single teaching period of the day raster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonSlot {
    /// 1-based period number.
    pub period_number: u8,
    pub start_time: String,
    pub end_time: String,
    /// Only schedulable for Sek-II course lanes.
    #[serde(default)]
    pub is_sek2_only: bool,
}

/// A non-teaching interval between two periods.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pause {
    /// The pause follows this period.
    pub after_period: u8,
    pub duration_minutes: u32,
    #[serde(default)]
    pub label: String,
}

/// A `(p, p+1)` pair that may host a double period.
///
/// Double periods across a pause are forbidden; `TimeGrid::validate`
/// rejects blocks that would straddle one.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoubleBlock {
    pub first: u8,
    pub second: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeGrid {
    pub days_per_week: u8,
    pub day_names: Vec<String>,
    pub lesson_slots: Vec<LessonSlot>,
    pub pauses: Vec<Pause>,
    pub double_blocks: Vec<DoubleBlock>,
    /// Last period available to Sek-I classes.
    pub sek1_max_period: u8,
    /// Last period available to Sek-II course lanes.
    pub sek2_max_period: u8,
}

impl TimeGrid {
    /// Structural invariants of the raster.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=6).contains(&self.days_per_week) {
            return Err(format!("days_per_week {} out of range", self.days_per_week));
        }
        let mut periods: Vec<u8> = self.lesson_slots.iter().map(|s| s.period_number).collect();
        let sorted = periods.windows(2).all(|w| w[0] < w[1]);
        if !sorted {
            return Err("lesson slots must be strictly ascending by period number".into());
        }
        periods.dedup();
        if periods.len() != self.lesson_slots.len() {
            return Err("duplicate period number in lesson slots".into());
        }
        if self.sek1_max_period > self.sek2_max_period {
            return Err(format!(
                "sek1_max_period {} exceeds sek2_max_period {}",
                self.sek1_max_period, self.sek2_max_period
            ));
        }
        let pause_afters: Vec<u8> = self.pauses.iter().map(|p| p.after_period).collect();
        for db in &self.double_blocks {
            if !periods.contains(&db.first) || !periods.contains(&db.second) {
                return Err(format!(
                    "double block {}-{} references unknown period",
                    db.first, db.second
                ));
            }
            if db.second != db.first + 1 {
                return Err(format!(
                    "double block {}-{} is not consecutive",
                    db.first, db.second
                ));
            }
            if pause_afters.contains(&db.first) {
                return Err(format!(
                    "double block {}-{} would straddle a pause",
                    db.first, db.second
                ));
            }
        }
        Ok(())
    }

    /// Periods a pause follows immediately.
    pub fn pause_after(&self, period: u8) -> bool {
        self.pauses.iter().any(|p| p.after_period == period)
    }

    /// Valid double-start periods, ascending.
    pub fn double_starts(&self) -> Vec<u8> {
        let mut starts: Vec<u8> = self.double_blocks.iter().map(|db| db.first).collect();
        starts.sort_unstable();
        starts
    }

    /// The default raster of a German Gymnasium: seven Sek-I periods with
    /// pauses after 2, 4 and 6, double blocks 1-2 / 3-4 / 5-6, and three
    /// Sek-II-only afternoon periods.
    pub fn default_gymnasium() -> Self {
        let slot = |n: u8, start: &str, end: &str, sek2: bool| LessonSlot {
            period_number: n,
            start_time: start.into(),
            end_time: end.into(),
            is_sek2_only: sek2,
        };
        Self {
            days_per_week: 5,
            day_names: ["Mo", "Di", "Mi", "Do", "Fr"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lesson_slots: vec![
                slot(1, "07:35", "08:20", false),
                slot(2, "08:25", "09:10", false),
                slot(3, "09:30", "10:15", false),
                slot(4, "10:20", "11:05", false),
                slot(5, "11:20", "12:05", false),
                slot(6, "12:10", "12:55", false),
                slot(7, "13:15", "14:00", false),
                slot(8, "14:00", "14:45", true),
                slot(9, "14:45", "15:30", true),
                slot(10, "15:30", "16:15", true),
            ],
            pauses: vec![
                Pause { after_period: 2, duration_minutes: 20, label: "Pause".into() },
                Pause { after_period: 4, duration_minutes: 15, label: "Pause".into() },
                Pause { after_period: 6, duration_minutes: 20, label: "Mittagspause".into() },
            ],
            double_blocks: vec![
                DoubleBlock { first: 1, second: 2 },
                DoubleBlock { first: 3, second: 4 },
                DoubleBlock { first: 5, second: 6 },
            ],
            sek1_max_period: 7,
            sek2_max_period: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_is_valid() {
        let grid = TimeGrid::default_gymnasium();
        assert!(grid.validate().is_ok());
        assert_eq!(grid.double_starts(), vec![1, 3, 5]);
        assert!(grid.pause_after(2));
        assert!(!grid.pause_after(3));
    }

    #[test]
    fn block_across_pause_is_rejected() {
        let mut grid = TimeGrid::default_gymnasium();
        grid.double_blocks.push(DoubleBlock { first: 2, second: 3 });
        let err = grid.validate().unwrap_err();
        assert!(err.contains("straddle"), "{err}");
    }

    #[test]
    fn non_consecutive_block_is_rejected() {
        let mut grid = TimeGrid::default_gymnasium();
        grid.double_blocks.push(DoubleBlock { first: 3, second: 5 });
        assert!(grid.validate().is_err());
    }

    #[test]
    fn duplicate_period_is_rejected() {
        let mut grid = TimeGrid::default_gymnasium();
        let dup = grid.lesson_slots[0].clone();
        grid.lesson_slots.insert(1, dup);
        assert!(grid.validate().is_err());
    }
}
