//! Recording a graded answer: the response row plus the stats upsert.

use super::stats;
use crate::database::QuizStore;
use crate::error::{EngineError, Result};
use crate::models::{Answer, Question, Quiz, QuizAttempt, QuizResponse};
use chrono::{DateTime, Utc};

/// Finds the question inside the attempt's quiz.
///
/// An id unknown to the store is a not-found error; a real question from
/// another quiz is a client-input error.
pub fn question_in_quiz<'a, S: QuizStore + ?Sized>(
    store: &S,
    quiz: &'a Quiz,
    question_id: i64,
) -> Result<&'a Question> {
    if let Some(question) = quiz.questions.iter().find(|q| q.id == question_id) {
        return Ok(question);
    }
    match store.get_question(question_id)? {
        None => Err(EngineError::not_found("question", question_id)),
        Some(_) => Err(EngineError::InvalidInput(format!(
            "question {question_id} is not part of quiz {}",
            quiz.id
        ))),
    }
}

/// Grades the answer, stores the response and folds it into the learner's statistics.
pub fn record_response<S: QuizStore + ?Sized>(
    store: &S,
    attempt: &QuizAttempt,
    question: &Question,
    answer: &Answer,
    response_time: f64,
    now: DateTime<Utc>,
) -> Result<QuizResponse> {
    let response_time = stats::check_response_time(response_time)?;
    let is_correct = question.grade(answer)?;

    let response = store.insert_response(&QuizResponse {
        id: 0,
        attempt_id: attempt.id,
        question_id: question.id,
        user_id: attempt.user_id,
        is_correct,
        marks_awarded: question.marks_for(is_correct),
        response_time,
        answered_at: now,
    })?;

    stats::upsert(
        store,
        attempt.user_id,
        question.id,
        is_correct,
        response_time,
        now,
    )?;

    Ok(response)
}
