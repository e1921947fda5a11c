//! Magnitude classes and their sub-ranges.
//!
//! The positive integers are cut at power-of-ten boundaries into one class per
//! order of magnitude (`A` = 1..9, `B` = 10..99, ...). Each class is split into
//! as many sub-ranges as its lower boundary has digits, except the first class
//! which is split in two.

use drill_core::OperandRange;
use tracing::warn;

use crate::generator::CurriculumConfig;

/// An operand range with its curriculum label (`B`, `B1`, `C3`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabeledRange {
    /// Class letter, optionally followed by the 1-based sub-range index
    pub label: String,
    /// The range itself
    pub range: OperandRange,
}

/// One order of magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnitudeClass {
    /// Class letter
    pub letter: char,
    /// The whole class span
    pub whole: LabeledRange,
    /// Sub-ranges covering the span, lowest first
    pub parts: Vec<LabeledRange>,
}

impl MagnitudeClass {
    /// The whole class followed by its sub-ranges.
    pub fn ranges(&self) -> impl Iterator<Item = &LabeledRange> {
        std::iter::once(&self.whole).chain(self.parts.iter())
    }
}

fn digit_count(mut n: u64) -> u32 {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Build the magnitude classes described by `config`.
///
/// Zero-width or inverted ranges are skipped with a warning.
pub fn magnitude_classes(config: &CurriculumConfig) -> Vec<MagnitudeClass> {
    let mut classes = Vec::new();

    for (i, &start) in config.boundaries.iter().enumerate() {
        let Some(letter) = u8::try_from(i)
            .ok()
            .and_then(|i| b'A'.checked_add(i))
            .filter(u8::is_ascii_uppercase)
            .map(char::from)
        else {
            warn!("Too many magnitude classes, ignoring boundary {}", start);
            break;
        };

        let end = match config.boundaries.get(i + 1) {
            Some(next) => next.saturating_sub(1),
            None => start.saturating_mul(10).saturating_sub(1),
        };
        let Some(whole) = OperandRange::new(start, end) else {
            warn!("Skipping class {} with invalid span [{}, {}]", letter, start, end);
            continue;
        };

        let parts = if i == 0 {
            config.first_class_parts.max(1)
        } else {
            digit_count(start)
        };
        let size = whole.width().div_ceil(u64::from(parts));

        let mut sub_ranges = Vec::new();
        for j in 0..u64::from(parts) {
            let sub_start = start + j * size;
            let sub_end = (sub_start + size - 1).min(end);
            match OperandRange::new(sub_start, sub_end) {
                Some(range) => sub_ranges.push(LabeledRange {
                    label: format!("{}{}", letter, j + 1),
                    range,
                }),
                None => warn!("Skipping empty sub-range {}{}", letter, j + 1),
            }
        }

        classes.push(MagnitudeClass {
            letter,
            whole: LabeledRange {
                label: letter.to_string(),
                range: whole,
            },
            parts: sub_ranges,
        });
    }

    classes
}
