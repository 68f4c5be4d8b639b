//! Pin management: caller-fixed lessons collected ahead of a solve.

use crate::{Pin, Slot, TeacherId};
use anyhow::{Context, Result};
use std::path::Path;

/// Collects pinned lessons and hands them to the solve driver.
///
/// A pin at an already-pinned (class, slot) replaces the old pin.
#[derive(Clone, Debug, Default)]
pub struct PinBoard {
    pins: Vec<Pin>,
}

impl PinBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut pin: Pin) {
        pin.teacher = TeacherId(pin.teacher.0.to_uppercase());
        self.pins
            .retain(|p| !(p.class == pin.class && p.slot == pin.slot));
        self.pins.push(pin);
    }

    /// Removes the pin of `teacher` at `slot`. Returns whether one existed.
    pub fn remove(&mut self, teacher: &TeacherId, slot: Slot) -> bool {
        let upper = TeacherId(teacher.0.to_uppercase());
        let before = self.pins.len();
        self.pins.retain(|p| !(p.teacher == upper && p.slot == slot));
        self.pins.len() < before
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.pins)?;
        std::fs::write(path, json).with_context(|| format!("writing pins to {}", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pins from {}", path.display()))?;
        let pins: Vec<Pin> = serde_json::from_str(&raw)?;
        let mut board = Self::new();
        for pin in pins {
            board.add(pin);
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(teacher: &str, class: &str, subject: &str, day: u8, period: u8) -> Pin {
        Pin {
            teacher: teacher.into(),
            class: class.into(),
            subject: subject.into(),
            slot: Slot::new(day, period),
        }
    }

    #[test]
    fn add_normalises_teacher_id() {
        let mut board = PinBoard::new();
        board.add(pin("mül", "5a", "Ma", 0, 3));
        assert_eq!(board.pins()[0].teacher.0, "MÜL");
    }

    #[test]
    fn add_replaces_pin_at_same_class_slot() {
        let mut board = PinBoard::new();
        board.add(pin("MUL", "5a", "Ma", 0, 3));
        board.add(pin("SCH", "5a", "De", 0, 3));
        assert_eq!(board.len(), 1);
        assert_eq!(board.pins()[0].teacher.0, "SCH");
    }

    #[test]
    fn remove_matches_teacher_and_slot() {
        let mut board = PinBoard::new();
        board.add(pin("MUL", "5a", "Ma", 0, 3));
        assert!(!board.remove(&"MUL".into(), Slot::new(0, 4)));
        assert!(board.remove(&"mul".into(), Slot::new(0, 3)));
        assert!(board.is_empty());
    }
}
