//! Practice and exam attempts: questions are answered in any order, each one once.

use super::grading;
use crate::database::QuizStore;
use crate::error::{EngineError, Result};
use crate::models::{Answer, AttemptMode, QuizAttempt, QuizResponse};
use chrono::{DateTime, Utc};
use log::info;

pub fn start_attempt<S: QuizStore + ?Sized>(
    store: &S,
    quiz_id: i64,
    user_id: i64,
    mode: AttemptMode,
    now: DateTime<Utc>,
) -> Result<QuizAttempt> {
    if mode == AttemptMode::Adaptive {
        return Err(EngineError::InvalidInput(
            "adaptive attempts are started through the adaptive controller".to_string(),
        ));
    }
    let quiz = store
        .get_quiz(quiz_id)?
        .ok_or_else(|| EngineError::not_found("quiz", quiz_id))?;

    let mut attempt = QuizAttempt::new(quiz.id, user_id, mode, now);
    attempt.current_question_id = quiz.questions.first().map(|q| q.id);
    store.create_attempt(&attempt)
}

/// Records an answer; a repeated answer to the same question returns the stored response.
pub fn submit_answer<S: QuizStore + ?Sized>(
    store: &S,
    attempt_id: i64,
    question_id: i64,
    answer: &Answer,
    response_time: f64,
    now: DateTime<Utc>,
) -> Result<QuizResponse> {
    let mut attempt = open_attempt(store, attempt_id)?;
    if attempt.mode == AttemptMode::Adaptive {
        return Err(EngineError::InvalidState(format!(
            "attempt {attempt_id} is adaptive and must be answered through the adaptive controller"
        )));
    }

    let quiz = store
        .get_quiz(attempt.quiz_id)?
        .ok_or_else(|| EngineError::not_found("quiz", attempt.quiz_id))?;
    let question = grading::question_in_quiz(store, &quiz, question_id)?;

    if let Some(existing) = store.find_response(attempt.id, question_id)? {
        return Ok(existing);
    }

    let response = grading::record_response(store, &attempt, question, answer, response_time, now)?;

    let answered = store.responses_for_attempt(attempt.id)?;
    attempt.current_question_index = answered.len() as u32;
    attempt.current_question_id = quiz
        .questions
        .iter()
        .find(|q| answered.iter().all(|r| r.question_id != q.id))
        .map(|q| q.id);
    store.save_attempt(&attempt)?;

    Ok(response)
}

/// Completes the attempt, scoring it against every question in the quiz.
pub fn finish_attempt<S: QuizStore + ?Sized>(
    store: &S,
    attempt_id: i64,
    now: DateTime<Utc>,
) -> Result<QuizAttempt> {
    let mut attempt = open_attempt(store, attempt_id)?;
    let quiz = store
        .get_quiz(attempt.quiz_id)?
        .ok_or_else(|| EngineError::not_found("quiz", attempt.quiz_id))?;
    let responses = store.responses_for_attempt(attempt.id)?;
    let correct = responses.iter().filter(|r| r.is_correct).count();

    let out_of = match attempt.mode {
        AttemptMode::Adaptive => responses.len(),
        _ => quiz.questions.len(),
    };
    attempt.complete(correct, out_of, now);
    store.save_attempt(&attempt)?;

    info!(
        "Attempt {} finished: {}/{} correct, score {:?}",
        attempt.id, correct, out_of, attempt.score
    );
    Ok(attempt)
}

fn open_attempt<S: QuizStore + ?Sized>(store: &S, attempt_id: i64) -> Result<QuizAttempt> {
    let attempt = store
        .get_attempt(attempt_id)?
        .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;
    if attempt.is_completed() {
        return Err(EngineError::InvalidState(format!(
            "attempt {attempt_id} is already completed"
        )));
    }
    Ok(attempt)
}
