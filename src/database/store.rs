//! Narrow data-access interfaces consumed by the scheduling engine.
//!
//! Every engine component is generic over these traits, so it only ever sees
//! typed records. `rusqlite::Connection` implements all of them in `db.rs`.

use crate::error::Result;
use crate::models::{
    CardReviewRecord, Flashcard, Question, QuestionKind, Quiz, QuizAttempt, QuizResponse,
    UserQuestionStats,
};
use chrono::{DateTime, Utc};

pub trait CardStore {
    fn get_card(&self, card_id: i64) -> Result<Option<Flashcard>>;
    fn save_card(&self, card: &Flashcard) -> Result<()>;
    fn append_review(&self, record: &CardReviewRecord) -> Result<CardReviewRecord>;
    fn reviews_for_card(&self, card_id: i64) -> Result<Vec<CardReviewRecord>>;
    fn due_cards(&self, deck_id: i64, now: DateTime<Utc>) -> Result<Vec<Flashcard>>;
}

pub trait QuestionStore {
    fn get_question(&self, question_id: i64) -> Result<Option<Question>>;
    fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>>;
}

pub trait AttemptStore {
    fn create_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt>;
    fn get_attempt(&self, attempt_id: i64) -> Result<Option<QuizAttempt>>;
    fn save_attempt(&self, attempt: &QuizAttempt) -> Result<()>;
}

pub trait ResponseStore {
    fn find_response(&self, attempt_id: i64, question_id: i64) -> Result<Option<QuizResponse>>;
    fn insert_response(&self, response: &QuizResponse) -> Result<QuizResponse>;
    fn responses_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizResponse>>;
    /// Responses from the user's completed attempts, joined to their question and quiz.
    fn history_for_user(&self, user_id: i64) -> Result<Vec<ResponseHistoryRow>>;
}

pub trait StatsStore {
    fn get_stats(&self, user_id: i64, question_id: i64) -> Result<Option<UserQuestionStats>>;
    fn get_stats_by_id(&self, stats_id: i64) -> Result<Option<UserQuestionStats>>;
    fn stats_for_user(&self, user_id: i64) -> Result<Vec<UserQuestionStats>>;
    /// Inserts or replaces the row for (user, question) and returns it with its id.
    fn upsert_stats(&self, stats: &UserQuestionStats) -> Result<UserQuestionStats>;
}

/// Everything a quiz attempt touches while answers are recorded.
pub trait QuizStore: QuestionStore + AttemptStore + ResponseStore + StatsStore {}

impl<T: QuestionStore + AttemptStore + ResponseStore + StatsStore + ?Sized> QuizStore for T {}

/// One historical response with the question and quiz fields the review queue needs.
#[derive(Clone, Debug)]
pub struct ResponseHistoryRow {
    pub response_id: i64,
    pub question_id: i64,
    pub is_correct: bool,
    pub response_time: f64,
    pub answered_at: DateTime<Utc>,
    pub question_text: String,
    pub question_kind: QuestionKind,
    pub difficulty: u8,
    pub question_topic: Option<String>,
    pub tags: Vec<String>,
    pub quiz_title: String,
    pub quiz_topic: Option<String>,
}
