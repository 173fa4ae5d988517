//! Per-(user, question) statistics.
//!
//! Two independent update paths touch the same row:
//! - `record_answer` runs on every graded quiz answer (practice, exam and adaptive)
//! - `apply_quality` runs only when the learner explicitly rates a spaced review
//!
//! Neither path ever decreases `times_answered`.

use crate::database::StatsStore;
use crate::error::{EngineError, Result};
use crate::models::sm2::{self, DEFAULT_EASE_FACTOR, Quality, Sm2State};
use crate::models::UserQuestionStats;
use chrono::{DateTime, Duration, Utc};
use log::debug;

/// Folds one answer into the existing statistics, seeding a new row on first sight.
pub fn record_answer(
    existing: Option<UserQuestionStats>,
    user_id: i64,
    question_id: i64,
    is_correct: bool,
    response_time: f64,
    now: DateTime<Utc>,
) -> UserQuestionStats {
    match existing {
        None => UserQuestionStats {
            id: 0,
            user_id,
            question_id,
            times_answered: 1,
            times_correct: is_correct as i32,
            streak: is_correct as i32,
            average_response_time: response_time,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            next_review_at: now,
            last_answered_at: Some(now),
            needs_review: !is_correct,
        },
        Some(mut stats) => {
            let previous = stats.times_answered.max(0) as f64;
            stats.average_response_time =
                (stats.average_response_time * previous + response_time) / (previous + 1.0);
            stats.times_answered += 1;
            if is_correct {
                stats.times_correct += 1;
                stats.streak += 1;
            } else {
                stats.streak = 0;
            }
            stats.last_answered_at = Some(now);
            stats.needs_review = !is_correct;
            stats
        }
    }
}

/// SM-2 update driven by an explicit Again/Good/Easy rating.
pub fn apply_quality(
    stats: &UserQuestionStats,
    quality: Quality,
    now: DateTime<Utc>,
) -> UserQuestionStats {
    let next = sm2::next_state(
        Sm2State {
            ease_factor: stats.ease_factor,
            interval_days: stats.interval_days,
            repetitions: stats.streak,
        },
        quality,
    );

    UserQuestionStats {
        ease_factor: next.ease_factor,
        interval_days: next.interval_days,
        streak: next.repetitions,
        next_review_at: now + Duration::days(next.interval_days as i64),
        needs_review: !quality.is_pass(),
        ..stats.clone()
    }
}

/// Answer-time upsert of the (user, question) row.
pub fn upsert<S: StatsStore + ?Sized>(
    store: &S,
    user_id: i64,
    question_id: i64,
    is_correct: bool,
    response_time: f64,
    now: DateTime<Utc>,
) -> Result<UserQuestionStats> {
    let existing = store.get_stats(user_id, question_id)?;
    let updated = record_answer(existing, user_id, question_id, is_correct, response_time, now);
    debug!(
        "Stats for user {} question {}: {}/{} correct, streak {}",
        user_id, question_id, updated.times_correct, updated.times_answered, updated.streak
    );
    store.upsert_stats(&updated)
}

/// Explicit spaced-review rating of a stats row.
pub fn submit_quality<S: StatsStore + ?Sized>(
    store: &S,
    stats_id: i64,
    quality: i64,
    now: DateTime<Utc>,
) -> Result<UserQuestionStats> {
    let quality = Quality::new(quality)?;
    let stats = store
        .get_stats_by_id(stats_id)?
        .ok_or_else(|| EngineError::not_found("question stats", stats_id))?;

    store.upsert_stats(&apply_quality(&stats, quality, now))
}

/// Validates a response time in seconds.
pub fn check_response_time(response_time: f64) -> Result<f64> {
    if response_time.is_finite() && response_time >= 0.0 {
        Ok(response_time)
    } else {
        Err(EngineError::InvalidInput(format!(
            "response time must be a non-negative number of seconds, got {response_time}"
        )))
    }
}
