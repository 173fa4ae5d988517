//! SM-2 (SuperMemo 2) spaced repetition update.
//!
//! Shared by flashcard reviews and the explicit spaced-review rating of
//! per-question statistics:
//! - Quality grades 0-2: repetitions reset to 0 and the interval drops to 1 day,
//!   the ease factor is left as it was
//! - Quality grades 3-5: interval grows 1 day → 6 days → interval × EF
//! - EF is adjusted after each correct review and never falls below 1.3

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// A recall rating, 0 = complete blackout, 5 = perfect response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i64) -> Result<Self> {
        if (0..=5).contains(&value) {
            Ok(Quality(value as u8))
        } else {
            Err(EngineError::InvalidInput(format!(
                "quality must be an integer between 0 and 5, got {value}"
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Ratings of 3 and above count as successful recall.
    pub fn is_pass(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<i64> for Quality {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self> {
        Quality::new(value)
    }
}

impl From<Quality> for i64 {
    fn from(q: Quality) -> Self {
        q.0 as i64
    }
}

/// The three scheduling fields the SM-2 update reads and writes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sm2State {
    pub ease_factor: f64,
    pub interval_days: i32,
    pub repetitions: i32,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
        }
    }
}

/// Calculates the scheduling state that follows a review of the given quality.
pub fn next_state(state: Sm2State, quality: Quality) -> Sm2State {
    if !quality.is_pass() {
        return Sm2State {
            ease_factor: state.ease_factor.max(MIN_EASE_FACTOR),
            interval_days: 1,
            repetitions: 0,
        };
    }

    let interval_days = match state.repetitions {
        0 => 1,
        1 => 6,
        _ => (state.interval_days as f64 * state.ease_factor).round() as i32,
    };

    // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
    let q = quality.value() as f64;
    let ease_factor = state.ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));

    Sm2State {
        ease_factor: ease_factor.max(MIN_EASE_FACTOR),
        interval_days,
        repetitions: state.repetitions + 1,
    }
}
