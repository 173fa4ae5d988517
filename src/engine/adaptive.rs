//! Adaptive quiz attempts.
//!
//! An attempt starts at difficulty 3 and moves one step up after a correct
//! answer and one step down after a wrong one, always within 1-5. The next
//! question is drawn from the target difficulty, then one below, then one
//! above; only when all three tiers are exhausted does it fall back to any
//! question not yet asked in this attempt. Answers from other attempts never
//! exclude a candidate.
//!
//! An attempt completes after `max_questions` responses, or earlier when the
//! quiz runs out of unasked questions.

use super::grading;
use crate::database::QuizStore;
use crate::error::{EngineError, Result};
use crate::models::question::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::models::{Answer, AttemptMode, Question, QuestionPrompt, QuizAttempt, QuizResponse};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_MAX_QUESTIONS: usize = 10;

/// Difficulty tiers to search, in order: target, target - 1, target + 1 (clamped, no repeats).
pub fn difficulty_search_order(target: u8) -> Vec<u8> {
    let target = target.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    let mut order = Vec::with_capacity(3);
    for tier in [
        target,
        target.saturating_sub(1).max(MIN_DIFFICULTY),
        target.saturating_add(1).min(MAX_DIFFICULTY),
    ] {
        if !order.contains(&tier) {
            order.push(tier);
        }
    }
    order
}

/// Picks the next question uniformly at random from the first non-empty difficulty tier,
/// falling back to any unasked question. `None` when every question has been asked.
pub fn select_next_question<'a, R: Rng + ?Sized>(
    questions: &'a [Question],
    asked: &HashSet<i64>,
    target: u8,
    rng: &mut R,
) -> Option<&'a Question> {
    let candidates: Vec<&Question> = questions.iter().filter(|q| !asked.contains(&q.id)).collect();

    for tier in difficulty_search_order(target) {
        let matches: Vec<&Question> = candidates
            .iter()
            .copied()
            .filter(|q| q.difficulty == tier)
            .collect();
        if let Some(question) = matches.choose(rng) {
            debug!("Selected question {} at difficulty {} (target {})", question.id, tier, target);
            return Some(*question);
        }
    }

    let fallback = candidates.choose(rng).copied();
    if let Some(question) = fallback {
        debug!(
            "No question near difficulty {}, falling back to question {} at {}",
            target, question.id, question.difficulty
        );
    }
    fallback
}

#[derive(Clone, Debug, Serialize)]
pub struct StartedAttempt {
    pub attempt: QuizAttempt,
    pub first_question: Option<QuestionPrompt>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnswerOutcome {
    pub response: QuizResponse,
    pub is_correct: bool,
    pub completed: bool,
    pub current_difficulty: u8,
    pub next_question: Option<QuestionPrompt>,
    pub score: Option<u32>,
}

pub struct AdaptiveQuizController {
    max_questions: usize,
}

impl Default for AdaptiveQuizController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUESTIONS)
    }
}

impl AdaptiveQuizController {
    pub fn new(max_questions: usize) -> Self {
        Self {
            max_questions: max_questions.max(1),
        }
    }

    pub fn max_questions(&self) -> usize {
        self.max_questions
    }

    /// Creates an adaptive attempt and serves its first question at difficulty 3.
    pub fn start<S: QuizStore + ?Sized, R: Rng + ?Sized>(
        &self,
        store: &S,
        quiz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<StartedAttempt> {
        let quiz = store
            .get_quiz(quiz_id)?
            .ok_or_else(|| EngineError::not_found("quiz", quiz_id))?;

        let mut attempt = QuizAttempt::new(quiz_id, user_id, AttemptMode::Adaptive, now);
        let first_question =
            select_next_question(&quiz.questions, &HashSet::new(), attempt.current_difficulty, rng)
                .map(Question::prompt);

        match &first_question {
            Some(question) => attempt.current_question_id = Some(question.id),
            None => attempt.complete(0, 0, now),
        }

        let attempt = store.create_attempt(&attempt)?;
        info!(
            "Started adaptive attempt {} on quiz {} for user {}",
            attempt.id, quiz_id, user_id
        );

        Ok(StartedAttempt {
            attempt,
            first_question,
        })
    }

    /// Grades an answer to the current question, steps the difficulty and serves the next question.
    ///
    /// Re-submitting an answer to an already answered question returns the stored response
    /// unchanged. Completed attempts reject every further answer.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_answer<S: QuizStore + ?Sized, R: Rng + ?Sized>(
        &self,
        store: &S,
        attempt_id: i64,
        question_id: i64,
        answer: &Answer,
        response_time: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<AnswerOutcome> {
        let mut attempt = store
            .get_attempt(attempt_id)?
            .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;

        if attempt.mode != AttemptMode::Adaptive {
            return Err(EngineError::InvalidState(format!(
                "attempt {attempt_id} is a {} attempt, not adaptive",
                attempt.mode.as_str()
            )));
        }
        if attempt.is_completed() {
            return Err(EngineError::InvalidState(format!(
                "attempt {attempt_id} is already completed"
            )));
        }

        let quiz = store
            .get_quiz(attempt.quiz_id)?
            .ok_or_else(|| EngineError::not_found("quiz", attempt.quiz_id))?;
        let question = grading::question_in_quiz(store, &quiz, question_id)?;

        if let Some(existing) = store.find_response(attempt.id, question_id)? {
            debug!(
                "Duplicate answer to question {} in attempt {}, returning stored response",
                question_id, attempt.id
            );
            let next_question = attempt
                .current_question_id
                .and_then(|id| quiz.questions.iter().find(|q| q.id == id))
                .map(Question::prompt);
            return Ok(AnswerOutcome {
                is_correct: existing.is_correct,
                response: existing,
                completed: false,
                current_difficulty: attempt.current_difficulty,
                next_question,
                score: None,
            });
        }

        if attempt.current_question_id != Some(question_id) {
            return Err(EngineError::InvalidInput(format!(
                "question {question_id} is not the current question of attempt {attempt_id}"
            )));
        }

        let response =
            grading::record_response(store, &attempt, question, answer, response_time, now)?;
        attempt.step_difficulty(response.is_correct);

        let responses = store.responses_for_attempt(attempt.id)?;
        let correct = responses.iter().filter(|r| r.is_correct).count();
        attempt.current_question_index = responses.len() as u32;

        let next_question = if responses.len() >= self.max_questions {
            attempt.complete(correct, self.max_questions, now);
            None
        } else {
            let asked: HashSet<i64> = responses.iter().map(|r| r.question_id).collect();
            match select_next_question(&quiz.questions, &asked, attempt.current_difficulty, rng) {
                Some(next) => {
                    attempt.current_question_id = Some(next.id);
                    Some(next.prompt())
                }
                None => {
                    attempt.complete(correct, responses.len(), now);
                    None
                }
            }
        };

        store.save_attempt(&attempt)?;

        if attempt.is_completed() {
            info!(
                "Adaptive attempt {} completed after {} answers, score {:?}, path {:?}",
                attempt.id,
                responses.len(),
                attempt.score,
                attempt.difficulty_path
            );
        }

        Ok(AnswerOutcome {
            is_correct: response.is_correct,
            response,
            completed: attempt.is_completed(),
            current_difficulty: attempt.current_difficulty,
            next_question,
            score: attempt.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::{self, NewQuestion};
    use crate::database::{AttemptStore, QuestionStore, ResponseStore, StatsStore};
    use crate::models::{AttemptStatus, QuestionKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rusqlite::Connection;

    fn question(id: i64, difficulty: u8) -> Question {
        Question {
            id,
            quiz_id: 1,
            text: format!("Q{id}"),
            kind: QuestionKind::ShortAnswer,
            options: vec![],
            reference_answer: Some("yes".to_string()),
            difficulty,
            topic: None,
            tags: vec![],
            marks: 1,
        }
    }

    /// Quiz with `per_tier` short-answer questions at every difficulty; the answer is always "yes".
    fn quiz_db(per_tier: usize) -> (Connection, i64) {
        let conn = db::open_in_memory().unwrap();
        let quiz_id = db::create_quiz(&conn, "Adaptive", Some("Polish")).unwrap();
        for difficulty in 1..=5u8 {
            for i in 0..per_tier {
                let text = format!("d{difficulty} #{i}");
                db::add_question(&conn, &NewQuestion::short_answer(quiz_id, &text, difficulty, "yes"))
                    .unwrap();
            }
        }
        (conn, quiz_id)
    }

    fn answer(correct: bool) -> Answer {
        Answer::Text(if correct { "yes" } else { "no" }.to_string())
    }

    #[test]
    fn test_search_order_is_clamped() {
        assert_eq!(difficulty_search_order(3), vec![3, 2, 4]);
        assert_eq!(difficulty_search_order(1), vec![1, 2]);
        assert_eq!(difficulty_search_order(5), vec![5, 4]);
    }

    #[test]
    fn test_selection_prefers_target_then_lower_then_higher() {
        let mut rng = StdRng::seed_from_u64(7);
        let questions = vec![question(1, 2), question(2, 4), question(3, 3)];

        let picked = select_next_question(&questions, &HashSet::new(), 3, &mut rng).unwrap();
        assert_eq!(picked.id, 3);

        let asked: HashSet<i64> = [3].into_iter().collect();
        let picked = select_next_question(&questions, &asked, 3, &mut rng).unwrap();
        assert_eq!(picked.id, 1);

        let asked: HashSet<i64> = [1, 3].into_iter().collect();
        let picked = select_next_question(&questions, &asked, 3, &mut rng).unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn test_selection_falls_back_outside_band() {
        let mut rng = StdRng::seed_from_u64(1);
        let questions = vec![question(1, 1), question(2, 5)];

        let picked = select_next_question(&questions, &HashSet::new(), 3, &mut rng).unwrap();
        assert!(picked.id == 1 || picked.id == 2);

        let all: HashSet<i64> = [1, 2].into_iter().collect();
        assert!(select_next_question(&questions, &all, 3, &mut rng).is_none());
    }

    #[test]
    fn test_start_serves_difficulty_three() {
        let (conn, quiz_id) = quiz_db(2);
        let mut rng = StdRng::seed_from_u64(3);
        let started = AdaptiveQuizController::default()
            .start(&conn, quiz_id, 1, Utc::now(), &mut rng)
            .unwrap();

        assert_eq!(started.attempt.difficulty_path, vec![3]);
        assert_eq!(started.first_question.unwrap().difficulty, 3);
        assert_eq!(started.attempt.status, AttemptStatus::InProgress);
    }

    #[test]
    fn test_difficulty_path_follows_answers() {
        let (conn, quiz_id) = quiz_db(3);
        let mut rng = StdRng::seed_from_u64(11);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        let attempt_id = started.attempt.id;
        let mut current = started.first_question.unwrap();

        for correct in [true, true, true, false, false] {
            let outcome = controller
                .submit_answer(&conn, attempt_id, current.id, &answer(correct), 5.0, Utc::now(), &mut rng)
                .unwrap();
            assert_eq!(outcome.is_correct, correct);
            current = outcome.next_question.unwrap();
            assert_eq!(current.difficulty, outcome.current_difficulty);
        }

        let attempt = conn.get_attempt(attempt_id).unwrap().unwrap();
        assert_eq!(attempt.difficulty_path, vec![3, 4, 5, 5, 4, 3]);
        assert_eq!(attempt.current_question_index, 5);
    }

    #[test]
    fn test_completes_after_ten_answers_and_rejects_more() {
        let (conn, quiz_id) = quiz_db(4);
        let mut rng = StdRng::seed_from_u64(5);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 9, Utc::now(), &mut rng).unwrap();
        let attempt_id = started.attempt.id;
        let mut current = started.first_question;
        let mut served = HashSet::new();
        let mut last = None;

        for i in 0..10 {
            let question = current.take().unwrap();
            assert!(served.insert(question.id), "question served twice");
            let outcome = controller
                .submit_answer(&conn, attempt_id, question.id, &answer(i % 3 != 0), 2.0, Utc::now(), &mut rng)
                .unwrap();
            assert!((1..=5).contains(&outcome.current_difficulty));
            current = outcome.next_question.clone();
            last = Some((question.id, outcome));
        }

        let (last_question, outcome) = last.unwrap();
        assert!(outcome.completed);
        assert!(outcome.next_question.is_none());
        // i % 3 != 0 is correct for 6 of the 10 answers
        assert_eq!(outcome.score, Some(60));

        let attempt = conn.get_attempt(attempt_id).unwrap().unwrap();
        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert_eq!(attempt.difficulty_path.len(), 11);

        let err = controller
            .submit_answer(&conn, attempt_id, last_question, &answer(true), 2.0, Utc::now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn test_duplicate_answer_is_idempotent() {
        let (conn, quiz_id) = quiz_db(2);
        let mut rng = StdRng::seed_from_u64(21);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        let first = started.first_question.unwrap();

        let outcome = controller
            .submit_answer(&conn, started.attempt.id, first.id, &answer(true), 3.0, Utc::now(), &mut rng)
            .unwrap();
        let again = controller
            .submit_answer(&conn, started.attempt.id, first.id, &answer(false), 9.0, Utc::now(), &mut rng)
            .unwrap();

        assert_eq!(again.response.id, outcome.response.id);
        assert!(again.is_correct);
        assert_eq!(
            again.next_question.map(|q| q.id),
            outcome.next_question.map(|q| q.id)
        );
        assert_eq!(conn.responses_for_attempt(started.attempt.id).unwrap().len(), 1);

        let stats = conn.get_stats(1, first.id).unwrap().unwrap();
        assert_eq!(stats.times_answered, 1);
    }

    #[test]
    fn test_empty_quiz_completes_at_start() {
        let conn = db::open_in_memory().unwrap();
        let quiz_id = db::create_quiz(&conn, "Empty", None).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();

        assert!(started.first_question.is_none());
        assert_eq!(started.attempt.status, AttemptStatus::Completed);
        assert_eq!(started.attempt.score, Some(0));
        assert_eq!(started.attempt.current_question_id, None);

        let stored = conn.get_attempt(started.attempt.id).unwrap().unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.score, Some(0));

        let result =
            controller.submit_answer(&conn, started.attempt.id, 1, &answer(true), 1.0, Utc::now(), &mut rng);
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_exhausted_quiz_completes_early() {
        let conn = db::open_in_memory().unwrap();
        let quiz_id = db::create_quiz(&conn, "Tiny", None).unwrap();
        for difficulty in [1, 3, 5] {
            db::add_question(&conn, &NewQuestion::short_answer(quiz_id, "?", difficulty, "yes"))
                .unwrap();
        }
        let mut rng = StdRng::seed_from_u64(2);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        let mut current = started.first_question;
        let mut outcome = None;

        for correct in [true, false, true] {
            let question = current.take().unwrap();
            let result = controller
                .submit_answer(&conn, started.attempt.id, question.id, &answer(correct), 1.0, Utc::now(), &mut rng)
                .unwrap();
            current = result.next_question.clone();
            outcome = Some(result);
        }

        let outcome = outcome.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.score, Some(67));
    }

    #[test]
    fn test_history_from_other_attempts_does_not_exclude() {
        let conn = db::open_in_memory().unwrap();
        let quiz_id = db::create_quiz(&conn, "Single", None).unwrap();
        let only = db::add_question(&conn, &NewQuestion::short_answer(quiz_id, "?", 3, "yes")).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let controller = AdaptiveQuizController::default();

        let first = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        controller
            .submit_answer(&conn, first.attempt.id, only, &answer(true), 1.0, Utc::now(), &mut rng)
            .unwrap();

        let second = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        assert_eq!(second.first_question.map(|q| q.id), Some(only));
    }

    #[test]
    fn test_rejects_wrong_question_and_unknown_attempt() {
        let (conn, quiz_id) = quiz_db(2);
        let mut rng = StdRng::seed_from_u64(8);
        let controller = AdaptiveQuizController::default();
        let started = controller.start(&conn, quiz_id, 1, Utc::now(), &mut rng).unwrap();
        let current = started.first_question.unwrap();
        let quiz = conn.get_quiz(quiz_id).unwrap().unwrap();
        let other = quiz.questions.iter().find(|q| q.id != current.id).unwrap();

        let err = controller
            .submit_answer(&conn, started.attempt.id, other.id, &answer(true), 1.0, Utc::now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err = controller
            .submit_answer(&conn, started.attempt.id, 9999, &answer(true), 1.0, Utc::now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "question", .. }));

        let err = controller
            .submit_answer(&conn, 777, current.id, &answer(true), 1.0, Utc::now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "attempt", .. }));

        let err = controller
            .submit_answer(&conn, started.attempt.id, current.id, &answer(true), -1.0, Utc::now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
