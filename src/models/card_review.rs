//! Audit row written once per flashcard review and never modified.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardReviewRecord {
    pub id: i64,
    pub card_id: i64,
    pub quality: u8,
    pub interval_before: i32,
    pub interval_after: i32,
    pub ease_before: f64,
    pub ease_after: f64,
    pub reviewed_at: DateTime<Utc>,
}
