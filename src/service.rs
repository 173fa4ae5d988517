//! Operation surface for an HTTP or CLI shell.
//!
//! `StudyService` owns the SQLite connection behind a mutex, so there is a
//! single writer. Every mutating call runs inside one immediate transaction:
//! the read-then-write of a stats row and the completed-attempt check cannot
//! interleave with another answer.

use crate::config::{ClockMode, EngineConfig};
use crate::database::db;
use crate::database::{AttemptStore, CardStore, StatsStore};
use crate::engine::{
    AdaptiveQuizController, AnswerOutcome, ReviewQueueItem, StartedAttempt, practice, priority,
    scheduler, stats,
};
use crate::error::{EngineError, Result};
use crate::export::json;
use crate::models::{
    Answer, AttemptMode, CardReviewRecord, Deck, Flashcard, QuizAttempt, QuizResponse,
    UserQuestionStats,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct StudyService {
    conn: Mutex<Connection>,
    config: EngineConfig,
    controller: AdaptiveQuizController,
}

impl StudyService {
    /// Opens the configured database file, creating the schema if needed.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let conn = db::init_database(&config.database_path)?;
        Ok(Self::with_connection(conn, config))
    }

    pub fn with_connection(conn: Connection, config: EngineConfig) -> Self {
        Self {
            controller: AdaptiveQuizController::new(config.max_questions),
            conn: Mutex::new(conn),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn now(&self, conn: &Connection) -> Result<DateTime<Utc>> {
        match self.config.clock {
            ClockMode::System => Ok(Utc::now()),
            ClockMode::Simulated => db::get_current_date(conn),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Connection, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        let now = self.now(&conn)?;
        f(&*conn, now)
    }

    /// Runs `f` in one transaction; nothing is committed if it fails.
    fn write<T>(&self, f: impl FnOnce(&Connection, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.now(&tx)?;
        let value = f(&*tx, now)?;
        tx.commit()?;
        Ok(value)
    }

    /// Rates a flashcard 0-5 and reschedules it.
    pub fn review_card(&self, card_id: i64, quality: i64) -> Result<Flashcard> {
        self.write(|conn, now| scheduler::review_card(conn, card_id, quality, now))
    }

    pub fn start_adaptive_attempt(&self, quiz_id: i64, user_id: i64) -> Result<StartedAttempt> {
        self.write(|conn, now| {
            self.controller
                .start(conn, quiz_id, user_id, now, &mut rand::thread_rng())
        })
    }

    pub fn submit_adaptive_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        answer: &Answer,
        response_time: f64,
    ) -> Result<AnswerOutcome> {
        self.write(|conn, now| {
            self.controller.submit_answer(
                conn,
                attempt_id,
                question_id,
                answer,
                response_time,
                now,
                &mut rand::thread_rng(),
            )
        })
    }

    /// Ranked review candidates; `limit` defaults to the configured queue size.
    pub fn get_spaced_review_queue(
        &self,
        user_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewQueueItem>> {
        let limit = limit.unwrap_or(self.config.review_queue_limit);
        self.read(|conn, now| priority::build_queue(conn, user_id, limit, now))
    }

    pub fn submit_spaced_review(&self, stats_id: i64, quality: i64) -> Result<UserQuestionStats> {
        self.write(|conn, now| stats::submit_quality(conn, stats_id, quality, now))
    }

    /// Starts an attempt in any mode. Adaptive attempts also get their first question picked.
    pub fn start_attempt(&self, quiz_id: i64, user_id: i64, mode: AttemptMode) -> Result<QuizAttempt> {
        match mode {
            AttemptMode::Adaptive => Ok(self.start_adaptive_attempt(quiz_id, user_id)?.attempt),
            _ => self.write(|conn, now| practice::start_attempt(conn, quiz_id, user_id, mode, now)),
        }
    }

    /// Answers a question in a practice or exam attempt.
    pub fn submit_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        answer: &Answer,
        response_time: f64,
    ) -> Result<QuizResponse> {
        self.write(|conn, now| {
            practice::submit_answer(conn, attempt_id, question_id, answer, response_time, now)
        })
    }

    pub fn attempt(&self, attempt_id: i64) -> Result<QuizAttempt> {
        self.read(|conn, _| {
            conn.get_attempt(attempt_id)?
                .ok_or_else(|| EngineError::not_found("attempt", attempt_id))
        })
    }

    pub fn finish_attempt(&self, attempt_id: i64) -> Result<QuizAttempt> {
        self.write(|conn, now| practice::finish_attempt(conn, attempt_id, now))
    }

    pub fn due_cards(&self, deck_id: i64) -> Result<Vec<Flashcard>> {
        self.read(|conn, now| {
            if db::get_deck(conn, deck_id)?.is_none() {
                return Err(EngineError::not_found("deck", deck_id));
            }
            conn.due_cards(deck_id, now)
        })
    }

    pub fn card_history(&self, card_id: i64) -> Result<Vec<CardReviewRecord>> {
        self.read(|conn, _| {
            if conn.get_card(card_id)?.is_none() {
                return Err(EngineError::not_found("card", card_id));
            }
            conn.reviews_for_card(card_id)
        })
    }

    pub fn question_stats(&self, user_id: i64) -> Result<Vec<UserQuestionStats>> {
        self.read(|conn, _| conn.stats_for_user(user_id))
    }

    pub fn decks(&self) -> Result<Vec<Deck>> {
        self.read(|conn, _| db::load_all_decks(conn))
    }

    /// Moves the simulated date one day forward.
    pub fn advance_day(&self) -> Result<DateTime<Utc>> {
        self.write(|conn, _| db::advance_day(conn))
    }

    /// Loads the sample deck and quiz into an empty database.
    pub fn seed(&self) -> Result<bool> {
        self.write(db::seed_sample_data)
    }

    pub fn export_deck(&self, deck_id: i64, path: &Path) -> Result<()> {
        let deck = self
            .read(|conn, _| db::get_deck(conn, deck_id))?
            .ok_or_else(|| EngineError::not_found("deck", deck_id))?;
        json::export_deck_to_path(&deck, path)
    }

    pub fn import_deck(&self, path: &Path) -> Result<Deck> {
        let deck = json::read_deck(path)?;
        self.write(|conn, now| json::import_deck(conn, &deck, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::QuestionStore;
    use crate::models::CardStatus;

    fn service(clock: ClockMode) -> StudyService {
        let config = EngineConfig {
            clock,
            ..EngineConfig::default()
        };
        StudyService::with_connection(db::open_in_memory().unwrap(), config)
    }

    #[test]
    fn test_review_card_through_service() {
        let service = service(ClockMode::Simulated);
        assert!(service.seed().unwrap());
        let decks = service.decks().unwrap();
        let deck = &decks[0];
        let card_id = deck.flashcards[0].id;

        assert_eq!(service.due_cards(deck.id).unwrap().len(), 3);

        let card = service.review_card(card_id, 4).unwrap();
        assert_eq!(card.status, CardStatus::Reviewing);
        assert_eq!(service.due_cards(deck.id).unwrap().len(), 2);

        service.advance_day().unwrap();
        assert_eq!(service.due_cards(deck.id).unwrap().len(), 3);
        assert_eq!(service.card_history(card_id).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let service = service(ClockMode::System);
        service.seed().unwrap();
        let card_id = service.decks().unwrap()[0].flashcards[0].id;

        assert!(service.review_card(card_id, 9).is_err());
        assert!(service.card_history(card_id).unwrap().is_empty());
        assert!(matches!(
            service.card_history(999),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_spaced_review_rating() {
        let service = service(ClockMode::Simulated);
        service.seed().unwrap();
        let started = service.start_adaptive_attempt(1, 5).unwrap();
        let prompt = started.first_question.unwrap();
        let question = service
            .read(|conn, _| conn.get_question(prompt.id))
            .unwrap()
            .unwrap();
        let answer = match question.options.iter().find(|o| o.is_correct) {
            Some(option) => Answer::Choice(option.id),
            None => Answer::Text(question.reference_answer.clone().unwrap()),
        };
        service
            .submit_adaptive_answer(started.attempt.id, question.id, &answer, 6.0)
            .unwrap();

        let row = service.question_stats(5).unwrap().remove(0);
        let rated = service.submit_spaced_review(row.id, 5).unwrap();
        assert_eq!(rated.interval_days, 6);
        assert_eq!(rated.times_answered, 1);
        assert!(!rated.needs_review);

        assert!(matches!(
            service.submit_spaced_review(row.id, -1),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_spaced_review(4040, 3),
            Err(EngineError::NotFound { .. })
        ));
    }
}
