//! Rolling per-(user, question) statistics.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserQuestionStats {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub times_answered: i32,
    pub times_correct: i32,
    /// Consecutive correct answers, also the SM-2 repetition count.
    pub streak: i32,
    pub average_response_time: f64,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review_at: DateTime<Utc>,
    pub last_answered_at: Option<DateTime<Utc>>,
    pub needs_review: bool,
}

impl UserQuestionStats {
    /// Accuracy as a percentage, 0 when never answered.
    pub fn accuracy(&self) -> f64 {
        if self.times_answered == 0 {
            0.0
        } else {
            self.times_correct as f64 / self.times_answered as f64 * 100.0
        }
    }
}
