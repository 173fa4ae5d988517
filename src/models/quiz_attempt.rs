//! A single run through a quiz and the responses recorded for it.
use super::question::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STARTING_DIFFICULTY: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptMode {
    Practice,
    Exam,
    Adaptive,
}

impl AttemptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptMode::Practice => "practice",
            AttemptMode::Exam => "exam",
            AttemptMode::Adaptive => "adaptive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "practice" => Some(AttemptMode::Practice),
            "exam" => Some(AttemptMode::Exam),
            "adaptive" => Some(AttemptMode::Adaptive),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => AttemptStatus::Completed,
            _ => AttemptStatus::InProgress,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub mode: AttemptMode,
    pub current_question_id: Option<i64>,
    /// Number of questions answered so far, i.e. the index of the question being served.
    pub current_question_index: u32,
    pub current_difficulty: u8,
    pub difficulty_path: Vec<u8>,
    pub status: AttemptStatus,
    pub score: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn new(quiz_id: i64, user_id: i64, mode: AttemptMode, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            quiz_id,
            user_id,
            mode,
            current_question_id: None,
            current_question_index: 0,
            current_difficulty: STARTING_DIFFICULTY,
            difficulty_path: vec![STARTING_DIFFICULTY],
            status: AttemptStatus::InProgress,
            score: None,
            started_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    /// Moves one difficulty step towards harder or easier questions and records it.
    pub fn step_difficulty(&mut self, was_correct: bool) -> u8 {
        self.current_difficulty = next_difficulty(self.current_difficulty, was_correct);
        self.difficulty_path.push(self.current_difficulty);
        self.current_difficulty
    }

    pub fn complete(&mut self, correct: usize, out_of: usize, now: DateTime<Utc>) {
        self.status = AttemptStatus::Completed;
        self.current_question_id = None;
        self.score = Some(percentage_score(correct, out_of));
        self.completed_at = Some(now);
    }
}

pub fn next_difficulty(current: u8, was_correct: bool) -> u8 {
    if was_correct {
        current.saturating_add(1).min(MAX_DIFFICULTY)
    } else {
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    }
}

/// round(100 × correct / out_of), 0 for an empty attempt.
pub fn percentage_score(correct: usize, out_of: usize) -> u32 {
    if out_of == 0 {
        return 0;
    }
    (100.0 * correct as f64 / out_of as f64).round() as u32
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizResponse {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub user_id: i64,
    pub is_correct: bool,
    pub marks_awarded: i32,
    /// Seconds taken to answer.
    pub response_time: f64,
    pub answered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_attempt_starts_at_three() {
        let attempt = QuizAttempt::new(1, 1, AttemptMode::Adaptive, Utc::now());
        assert_eq!(attempt.current_difficulty, 3);
        assert_eq!(attempt.difficulty_path, vec![3]);
        assert_eq!(attempt.status, AttemptStatus::InProgress);
    }

    #[test]
    fn test_difficulty_path_caps_and_descends() {
        let mut attempt = QuizAttempt::new(1, 1, AttemptMode::Adaptive, Utc::now());
        for correct in [true, true, true, false, false] {
            attempt.step_difficulty(correct);
        }
        assert_eq!(attempt.difficulty_path, vec![3, 4, 5, 5, 4, 3]);
    }

    #[test]
    fn test_difficulty_floor() {
        let mut attempt = QuizAttempt::new(1, 1, AttemptMode::Adaptive, Utc::now());
        for _ in 0..6 {
            attempt.step_difficulty(false);
            assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&attempt.current_difficulty));
        }
        assert_eq!(attempt.current_difficulty, 1);
    }

    #[test]
    fn test_percentage_score() {
        assert_eq!(percentage_score(7, 10), 70);
        assert_eq!(percentage_score(2, 3), 67);
        assert_eq!(percentage_score(0, 0), 0);
    }

    #[test]
    fn test_complete() {
        let mut attempt = QuizAttempt::new(1, 1, AttemptMode::Adaptive, Utc::now());
        attempt.current_question_id = Some(4);
        attempt.complete(6, 10, Utc::now());
        assert!(attempt.is_completed());
        assert_eq!(attempt.score, Some(60));
        assert_eq!(attempt.current_question_id, None);
    }
}
