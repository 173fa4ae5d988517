//! SQLite persistence for decks, flashcards, quizzes, attempts and learner statistics
//!
//! Handles schema initialization, the CRUD helpers used for seeding and import,
//! the simulated "current date" and the store trait implementations used by the engine.

use super::store::{
    AttemptStore, CardStore, QuestionStore, ResponseHistoryRow, ResponseStore, StatsStore,
};
use crate::error::{EngineError, Result};
use crate::models::question::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::models::{
    AnswerOption, AttemptMode, AttemptStatus, CardReviewRecord, CardStatus, Deck, Flashcard,
    Question, QuestionKind, Quiz, QuizAttempt, QuizResponse, UserQuestionStats,
};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS decks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS flashcards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        deck_id INTEGER NOT NULL,
        front TEXT NOT NULL,
        back TEXT NOT NULL,
        ease_factor REAL NOT NULL DEFAULT 2.5,
        interval_days INTEGER NOT NULL DEFAULT 0,
        repetitions INTEGER NOT NULL DEFAULT 0,
        due_at INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE,
        UNIQUE(deck_id, front)
    );

    CREATE TABLE IF NOT EXISTS card_reviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        card_id INTEGER NOT NULL,
        quality INTEGER NOT NULL,
        interval_before INTEGER NOT NULL,
        interval_after INTEGER NOT NULL,
        ease_before REAL NOT NULL,
        ease_after REAL NOT NULL,
        reviewed_at INTEGER NOT NULL,
        FOREIGN KEY (card_id) REFERENCES flashcards(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS quizzes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        topic TEXT
    );

    CREATE TABLE IF NOT EXISTS questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quiz_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('multiple_choice', 'true_false', 'short_answer')),
        reference_answer TEXT,
        difficulty INTEGER NOT NULL DEFAULT 3,
        topic TEXT,
        tags TEXT,
        marks INTEGER NOT NULL DEFAULT 1,
        position INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS answer_options (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        is_correct INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS quiz_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quiz_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        mode TEXT NOT NULL,
        current_question_id INTEGER,
        current_question_index INTEGER NOT NULL DEFAULT 0,
        current_difficulty INTEGER NOT NULL DEFAULT 3,
        difficulty_path TEXT NOT NULL DEFAULT '[3]',
        status TEXT NOT NULL DEFAULT 'in_progress',
        score INTEGER,
        started_at INTEGER NOT NULL,
        completed_at INTEGER,
        FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS quiz_responses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        attempt_id INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        is_correct INTEGER NOT NULL,
        marks_awarded INTEGER NOT NULL DEFAULT 0,
        response_time REAL NOT NULL DEFAULT 0,
        answered_at INTEGER NOT NULL,
        FOREIGN KEY (attempt_id) REFERENCES quiz_attempts(id) ON DELETE CASCADE,
        FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
        UNIQUE(attempt_id, question_id)
    );

    CREATE INDEX IF NOT EXISTS idx_quiz_responses_user ON quiz_responses(user_id);

    CREATE TABLE IF NOT EXISTS user_question_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        times_answered INTEGER NOT NULL DEFAULT 0,
        times_correct INTEGER NOT NULL DEFAULT 0,
        streak INTEGER NOT NULL DEFAULT 0,
        average_response_time REAL NOT NULL DEFAULT 0,
        ease_factor REAL NOT NULL DEFAULT 2.5,
        interval_days INTEGER NOT NULL DEFAULT 0,
        next_review_at INTEGER NOT NULL,
        last_answered_at INTEGER,
        needs_review INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
        UNIQUE(user_id, question_id)
    );

    CREATE TABLE IF NOT EXISTS app_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Opens (or creates) the database file and makes sure the schema exists.
pub fn init_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    debug!("Opened database at {}", path.display());
    Ok(conn)
}

/// Fresh in-memory database, used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates all tables and sets the simulated current date to now if not already initialized.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;

    conn.execute(
        "INSERT OR IGNORE INTO app_state (key, value) VALUES ('current_date', ?1)",
        params![Utc::now().timestamp().to_string()],
    )?;

    Ok(())
}

pub(crate) fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

/// Retrieves the simulated current date from the database
pub fn get_current_date(conn: &Connection) -> Result<DateTime<Utc>> {
    let timestamp: String = conn.query_row(
        "SELECT value FROM app_state WHERE key = 'current_date'",
        [],
        |row| row.get(0),
    )?;

    let secs = timestamp.trim().parse::<i64>().map_err(|_| {
        EngineError::InvalidState(format!("stored current date is not a timestamp: {timestamp:?}"))
    })?;
    Ok(from_timestamp(secs))
}

pub fn set_current_date(conn: &Connection, date: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO app_state (key, value) VALUES ('current_date', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![date.timestamp().to_string()],
    )?;
    Ok(())
}

/// Advances the simulated date by 24 hours and returns the new date.
pub fn advance_day(conn: &Connection) -> Result<DateTime<Utc>> {
    let next_day = get_current_date(conn)? + Duration::days(1);
    set_current_date(conn, next_day)?;
    Ok(next_day)
}

/// Creates a new deck and returns its id
pub fn create_deck(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO decks (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn deck_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM decks WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Adds a flashcard to a deck with fresh scheduling fields, due at `now`.
///
/// Returns the flashcard id. If the card already exists (same deck + front),
/// the existing id is returned and the card is left untouched.
pub fn add_flashcard(
    conn: &Connection,
    deck_id: i64,
    front: &str,
    back: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let card = Flashcard::new(deck_id, front, back, now);
    conn.execute(
        "INSERT OR IGNORE INTO flashcards
            (deck_id, front, back, ease_factor, interval_days, repetitions, due_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            card.deck_id,
            card.front,
            card.back,
            card.ease_factor,
            card.interval_days,
            card.repetitions,
            card.due_at.timestamp(),
            card.status.as_str()
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM flashcards WHERE deck_id = ?1 AND front = ?2",
        params![deck_id, front],
        |row| row.get(0),
    )?;
    Ok(id)
}

const CARD_COLUMNS: &str =
    "id, deck_id, front, back, ease_factor, interval_days, repetitions, due_at, status";

fn card_from_row(row: &Row) -> rusqlite::Result<Flashcard> {
    Ok(Flashcard {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        ease_factor: row.get(4)?,
        interval_days: row.get(5)?,
        repetitions: row.get(6)?,
        due_at: from_timestamp(row.get(7)?),
        status: CardStatus::parse(&row.get::<_, String>(8)?),
    })
}

fn cards_for_deck(conn: &Connection, deck_id: i64) -> Result<Vec<Flashcard>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_COLUMNS} FROM flashcards WHERE deck_id = ?1 ORDER BY id"
    ))?;
    let cards = stmt
        .query_map(params![deck_id], card_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cards)
}

/// Loads one deck with all of its cards
pub fn get_deck(conn: &Connection, deck_id: i64) -> Result<Option<Deck>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM decks WHERE id = ?1",
            params![deck_id],
            |row| row.get(0),
        )
        .optional()?;

    match name {
        Some(name) => Ok(Some(Deck {
            id: deck_id,
            name,
            flashcards: cards_for_deck(conn, deck_id)?,
        })),
        None => Ok(None),
    }
}

/// Loads all decks with their flashcards into memory
pub fn load_all_decks(conn: &Connection) -> Result<Vec<Deck>> {
    let mut stmt = conn.prepare("SELECT id, name FROM decks ORDER BY id")?;
    let decks = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    decks
        .into_iter()
        .map(|(id, name)| -> Result<Deck> {
            Ok(Deck {
                id,
                name,
                flashcards: cards_for_deck(conn, id)?,
            })
        })
        .collect()
}

pub fn create_quiz(conn: &Connection, title: &str, topic: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO quizzes (title, topic) VALUES (?1, ?2)",
        params![title, topic],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Question content as authored, before it has an id.
#[derive(Clone, Debug)]
pub struct NewQuestion {
    pub quiz_id: i64,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<(String, bool)>,
    pub reference_answer: Option<String>,
    pub difficulty: u8,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub marks: i32,
}

impl NewQuestion {
    pub fn multiple_choice(quiz_id: i64, text: &str, difficulty: u8, options: &[(&str, bool)]) -> Self {
        Self {
            quiz_id,
            text: text.to_string(),
            kind: QuestionKind::MultipleChoice,
            options: options.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            reference_answer: None,
            difficulty,
            topic: None,
            tags: Vec::new(),
            marks: 1,
        }
    }

    pub fn short_answer(quiz_id: i64, text: &str, difficulty: u8, reference: &str) -> Self {
        Self {
            quiz_id,
            text: text.to_string(),
            kind: QuestionKind::ShortAnswer,
            options: Vec::new(),
            reference_answer: Some(reference.to_string()),
            difficulty,
            topic: None,
            tags: Vec::new(),
            marks: 1,
        }
    }
}

/// Adds a question and its answer options to a quiz, returning the question id.
pub fn add_question(conn: &Connection, question: &NewQuestion) -> Result<i64> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&question.difficulty) {
        return Err(EngineError::InvalidInput(format!(
            "difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {}",
            question.difficulty
        )));
    }

    let position: i64 = conn.query_row(
        "SELECT COUNT(*) FROM questions WHERE quiz_id = ?1",
        params![question.quiz_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO questions
            (quiz_id, text, kind, reference_answer, difficulty, topic, tags, marks, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            question.quiz_id,
            question.text,
            question.kind.as_str(),
            question.reference_answer,
            question.difficulty,
            question.topic,
            serde_json::to_string(&question.tags)?,
            question.marks,
            position
        ],
    )?;
    let question_id = conn.last_insert_rowid();

    for (i, (text, is_correct)) in question.options.iter().enumerate() {
        conn.execute(
            "INSERT INTO answer_options (question_id, text, is_correct, position)
             VALUES (?1, ?2, ?3, ?4)",
            params![question_id, text, is_correct, i as i64],
        )?;
    }

    Ok(question_id)
}

/// Creates a sample deck and quiz when the database has no decks yet.
///
/// Returns false if there was already data.
pub fn seed_sample_data(conn: &Connection, now: DateTime<Utc>) -> Result<bool> {
    let deck_count: i64 = conn.query_row("SELECT COUNT(*) FROM decks", [], |row| row.get(0))?;
    if deck_count > 0 {
        return Ok(false);
    }

    let deck_id = create_deck(conn, "Polish Vocabulary")?;
    add_flashcard(conn, deck_id, "cześć", "hello", now)?;
    add_flashcard(conn, deck_id, "dziękuję", "thank you", now)?;
    add_flashcard(conn, deck_id, "proszę", "please", now)?;

    let quiz_id = create_quiz(conn, "Polish Basics", Some("Polish"))?;
    let questions = [
        NewQuestion::multiple_choice(quiz_id, "\"tak\" means", 1, &[("yes", true), ("no", false)]),
        NewQuestion::multiple_choice(quiz_id, "\"nie\" means", 1, &[("yes", false), ("no", true)]),
        NewQuestion::short_answer(quiz_id, "Translate \"cześć\"", 2, "hello"),
        NewQuestion::short_answer(quiz_id, "Translate \"dziękuję\"", 2, "thank you"),
        NewQuestion::multiple_choice(
            quiz_id,
            "Which word means \"please\"?",
            3,
            &[("proszę", true), ("przepraszam", false), ("dzień dobry", false)],
        ),
        NewQuestion::short_answer(quiz_id, "Translate \"dzień dobry\"", 3, "good morning"),
        NewQuestion::multiple_choice(
            quiz_id,
            "Genitive of \"kot\"",
            4,
            &[("kota", true), ("kotu", false), ("kotem", false)],
        ),
        NewQuestion::short_answer(quiz_id, "Plural of \"dziecko\"", 4, "dzieci"),
        NewQuestion::multiple_choice(
            quiz_id,
            "Perfective of \"pisać\"",
            5,
            &[("napisać", true), ("pisywać", false), ("wypisywać", false)],
        ),
        NewQuestion::short_answer(quiz_id, "Instrumental of \"ja\"", 5, "mną"),
    ];
    for mut question in questions {
        question.topic = Some(
            if question.difficulty >= 4 { "Grammar" } else { "Vocabulary" }.to_string(),
        );
        add_question(conn, &question)?;
    }

    Ok(true)
}

/// Parses the JSON tag list of a question. A malformed list is logged and treated as empty.
fn parse_tags(raw: Option<String>, question_id: i64) -> Vec<String> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Vec::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Malformed tag list on question {}: {}", question_id, e);
            Vec::new()
        }),
    }
}

fn clamp_difficulty(raw: i64) -> u8 {
    raw.clamp(MIN_DIFFICULTY as i64, MAX_DIFFICULTY as i64) as u8
}

const QUESTION_COLUMNS: &str =
    "id, quiz_id, text, kind, reference_answer, difficulty, topic, tags, marks";

fn question_from_row(row: &Row) -> rusqlite::Result<Question> {
    let id: i64 = row.get(0)?;
    Ok(Question {
        id,
        quiz_id: row.get(1)?,
        text: row.get(2)?,
        kind: QuestionKind::parse(&row.get::<_, String>(3)?)
            .unwrap_or(QuestionKind::MultipleChoice),
        options: Vec::new(),
        reference_answer: row.get(4)?,
        difficulty: clamp_difficulty(row.get(5)?),
        topic: row.get(6)?,
        tags: parse_tags(row.get(7)?, id),
        marks: row.get(8)?,
    })
}

fn options_for_question(conn: &Connection, question_id: i64) -> Result<Vec<AnswerOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, text, is_correct FROM answer_options
         WHERE question_id = ?1 ORDER BY position, id",
    )?;
    let options = stmt
        .query_map(params![question_id], |row| {
            Ok(AnswerOption {
                id: row.get(0)?,
                text: row.get(1)?,
                is_correct: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(options)
}

impl QuestionStore for Connection {
    fn get_question(&self, question_id: i64) -> Result<Option<Question>> {
        let question = self
            .query_row(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
                params![question_id],
                question_from_row,
            )
            .optional()?;

        match question {
            Some(mut question) => {
                question.options = options_for_question(self, question.id)?;
                Ok(Some(question))
            }
            None => Ok(None),
        }
    }

    fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>> {
        let header = self
            .query_row(
                "SELECT title, topic FROM quizzes WHERE id = ?1",
                params![quiz_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        let Some((title, topic)) = header else {
            return Ok(None);
        };

        let mut stmt = self.prepare(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = ?1 ORDER BY position, id"
        ))?;
        let mut questions = stmt
            .query_map(params![quiz_id], question_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for question in &mut questions {
            question.options = options_for_question(self, question.id)?;
        }

        Ok(Some(Quiz {
            id: quiz_id,
            title,
            topic,
            questions,
        }))
    }
}

impl CardStore for Connection {
    fn get_card(&self, card_id: i64) -> Result<Option<Flashcard>> {
        let card = self
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE id = ?1"),
                params![card_id],
                card_from_row,
            )
            .optional()?;
        Ok(card)
    }

    fn save_card(&self, card: &Flashcard) -> Result<()> {
        let updated = self.execute(
            "UPDATE flashcards
             SET ease_factor = ?1, interval_days = ?2, repetitions = ?3, due_at = ?4, status = ?5
             WHERE id = ?6",
            params![
                card.ease_factor,
                card.interval_days,
                card.repetitions,
                card.due_at.timestamp(),
                card.status.as_str(),
                card.id
            ],
        )?;
        if updated == 0 {
            return Err(EngineError::not_found("card", card.id));
        }
        Ok(())
    }

    fn append_review(&self, record: &CardReviewRecord) -> Result<CardReviewRecord> {
        self.execute(
            "INSERT INTO card_reviews
                (card_id, quality, interval_before, interval_after, ease_before, ease_after, reviewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.card_id,
                record.quality,
                record.interval_before,
                record.interval_after,
                record.ease_before,
                record.ease_after,
                record.reviewed_at.timestamp()
            ],
        )?;
        Ok(CardReviewRecord {
            id: self.last_insert_rowid(),
            ..record.clone()
        })
    }

    fn reviews_for_card(&self, card_id: i64) -> Result<Vec<CardReviewRecord>> {
        let mut stmt = self.prepare(
            "SELECT id, card_id, quality, interval_before, interval_after, ease_before, ease_after, reviewed_at
             FROM card_reviews WHERE card_id = ?1 ORDER BY reviewed_at, id",
        )?;
        let records = stmt
            .query_map(params![card_id], |row| {
                Ok(CardReviewRecord {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    quality: row.get(2)?,
                    interval_before: row.get(3)?,
                    interval_after: row.get(4)?,
                    ease_before: row.get(5)?,
                    ease_after: row.get(6)?,
                    reviewed_at: from_timestamp(row.get(7)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Cards where due_at <= now, oldest due first.
    fn due_cards(&self, deck_id: i64, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM flashcards
             WHERE deck_id = ?1 AND due_at <= ?2
             ORDER BY due_at ASC, id ASC"
        ))?;
        let cards = stmt
            .query_map(params![deck_id, now.timestamp()], card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }
}

const ATTEMPT_COLUMNS: &str = "id, quiz_id, user_id, mode, current_question_id, current_question_index, \
     current_difficulty, difficulty_path, status, score, started_at, completed_at";

fn attempt_from_row(row: &Row) -> rusqlite::Result<QuizAttempt> {
    let id: i64 = row.get(0)?;
    let current_difficulty = clamp_difficulty(row.get(6)?);
    let raw_path: String = row.get(7)?;
    let difficulty_path = serde_json::from_str(&raw_path).unwrap_or_else(|e| {
        warn!("Malformed difficulty path on attempt {}: {}", id, e);
        vec![current_difficulty]
    });

    Ok(QuizAttempt {
        id,
        quiz_id: row.get(1)?,
        user_id: row.get(2)?,
        mode: AttemptMode::parse(&row.get::<_, String>(3)?).unwrap_or(AttemptMode::Practice),
        current_question_id: row.get(4)?,
        current_question_index: row.get(5)?,
        current_difficulty,
        difficulty_path,
        status: AttemptStatus::parse(&row.get::<_, String>(8)?),
        score: row.get(9)?,
        started_at: from_timestamp(row.get(10)?),
        completed_at: row.get::<_, Option<i64>>(11)?.map(from_timestamp),
    })
}

impl AttemptStore for Connection {
    fn create_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt> {
        self.execute(
            "INSERT INTO quiz_attempts
                (quiz_id, user_id, mode, current_question_id, current_question_index,
                 current_difficulty, difficulty_path, status, score, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                attempt.quiz_id,
                attempt.user_id,
                attempt.mode.as_str(),
                attempt.current_question_id,
                attempt.current_question_index,
                attempt.current_difficulty,
                serde_json::to_string(&attempt.difficulty_path)?,
                attempt.status.as_str(),
                attempt.score,
                attempt.started_at.timestamp(),
                attempt.completed_at.map(|t| t.timestamp())
            ],
        )?;
        Ok(QuizAttempt {
            id: self.last_insert_rowid(),
            ..attempt.clone()
        })
    }

    fn get_attempt(&self, attempt_id: i64) -> Result<Option<QuizAttempt>> {
        let attempt = self
            .query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = ?1"),
                params![attempt_id],
                attempt_from_row,
            )
            .optional()?;
        Ok(attempt)
    }

    fn save_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        let updated = self.execute(
            "UPDATE quiz_attempts
             SET current_question_id = ?1, current_question_index = ?2, current_difficulty = ?3,
                 difficulty_path = ?4, status = ?5, score = ?6, completed_at = ?7
             WHERE id = ?8",
            params![
                attempt.current_question_id,
                attempt.current_question_index,
                attempt.current_difficulty,
                serde_json::to_string(&attempt.difficulty_path)?,
                attempt.status.as_str(),
                attempt.score,
                attempt.completed_at.map(|t| t.timestamp()),
                attempt.id
            ],
        )?;
        if updated == 0 {
            return Err(EngineError::not_found("attempt", attempt.id));
        }
        Ok(())
    }
}

const RESPONSE_COLUMNS: &str =
    "id, attempt_id, question_id, user_id, is_correct, marks_awarded, response_time, answered_at";

fn response_from_row(row: &Row) -> rusqlite::Result<QuizResponse> {
    Ok(QuizResponse {
        id: row.get(0)?,
        attempt_id: row.get(1)?,
        question_id: row.get(2)?,
        user_id: row.get(3)?,
        is_correct: row.get(4)?,
        marks_awarded: row.get(5)?,
        response_time: row.get(6)?,
        answered_at: from_timestamp(row.get(7)?),
    })
}

impl ResponseStore for Connection {
    fn find_response(&self, attempt_id: i64, question_id: i64) -> Result<Option<QuizResponse>> {
        let response = self
            .query_row(
                &format!(
                    "SELECT {RESPONSE_COLUMNS} FROM quiz_responses
                     WHERE attempt_id = ?1 AND question_id = ?2"
                ),
                params![attempt_id, question_id],
                response_from_row,
            )
            .optional()?;
        Ok(response)
    }

    fn insert_response(&self, response: &QuizResponse) -> Result<QuizResponse> {
        self.execute(
            "INSERT INTO quiz_responses
                (attempt_id, question_id, user_id, is_correct, marks_awarded, response_time, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                response.attempt_id,
                response.question_id,
                response.user_id,
                response.is_correct,
                response.marks_awarded,
                response.response_time,
                response.answered_at.timestamp()
            ],
        )?;
        Ok(QuizResponse {
            id: self.last_insert_rowid(),
            ..response.clone()
        })
    }

    fn responses_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizResponse>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM quiz_responses WHERE attempt_id = ?1 ORDER BY id"
        ))?;
        let responses = stmt
            .query_map(params![attempt_id], response_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(responses)
    }

    fn history_for_user(&self, user_id: i64) -> Result<Vec<ResponseHistoryRow>> {
        let mut stmt = self.prepare(
            "SELECT r.id, r.question_id, r.is_correct, r.response_time, r.answered_at,
                    q.text, q.kind, q.difficulty, q.topic, q.tags, z.title, z.topic
             FROM quiz_responses r
             JOIN questions q ON q.id = r.question_id
             JOIN quizzes z ON z.id = q.quiz_id
             JOIN quiz_attempts a ON a.id = r.attempt_id
             WHERE r.user_id = ?1 AND a.status = 'completed'
             ORDER BY r.answered_at ASC, r.id ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let question_id: i64 = row.get(1)?;
                Ok(ResponseHistoryRow {
                    response_id: row.get(0)?,
                    question_id,
                    is_correct: row.get(2)?,
                    response_time: row.get(3)?,
                    answered_at: from_timestamp(row.get(4)?),
                    question_text: row.get(5)?,
                    question_kind: QuestionKind::parse(&row.get::<_, String>(6)?)
                        .unwrap_or(QuestionKind::MultipleChoice),
                    difficulty: clamp_difficulty(row.get(7)?),
                    question_topic: row.get(8)?,
                    tags: parse_tags(row.get(9)?, question_id),
                    quiz_title: row.get(10)?,
                    quiz_topic: row.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const STATS_COLUMNS: &str = "id, user_id, question_id, times_answered, times_correct, streak, \
     average_response_time, ease_factor, interval_days, next_review_at, last_answered_at, needs_review";

fn stats_from_row(row: &Row) -> rusqlite::Result<UserQuestionStats> {
    Ok(UserQuestionStats {
        id: row.get(0)?,
        user_id: row.get(1)?,
        question_id: row.get(2)?,
        times_answered: row.get(3)?,
        times_correct: row.get(4)?,
        streak: row.get(5)?,
        average_response_time: row.get(6)?,
        ease_factor: row.get(7)?,
        interval_days: row.get(8)?,
        next_review_at: from_timestamp(row.get(9)?),
        last_answered_at: row.get::<_, Option<i64>>(10)?.map(from_timestamp),
        needs_review: row.get(11)?,
    })
}

impl StatsStore for Connection {
    fn get_stats(&self, user_id: i64, question_id: i64) -> Result<Option<UserQuestionStats>> {
        let stats = self
            .query_row(
                &format!(
                    "SELECT {STATS_COLUMNS} FROM user_question_stats
                     WHERE user_id = ?1 AND question_id = ?2"
                ),
                params![user_id, question_id],
                stats_from_row,
            )
            .optional()?;
        Ok(stats)
    }

    fn get_stats_by_id(&self, stats_id: i64) -> Result<Option<UserQuestionStats>> {
        let stats = self
            .query_row(
                &format!("SELECT {STATS_COLUMNS} FROM user_question_stats WHERE id = ?1"),
                params![stats_id],
                stats_from_row,
            )
            .optional()?;
        Ok(stats)
    }

    fn stats_for_user(&self, user_id: i64) -> Result<Vec<UserQuestionStats>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {STATS_COLUMNS} FROM user_question_stats WHERE user_id = ?1 ORDER BY question_id"
        ))?;
        let stats = stmt
            .query_map(params![user_id], stats_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    fn upsert_stats(&self, stats: &UserQuestionStats) -> Result<UserQuestionStats> {
        self.execute(
            "INSERT INTO user_question_stats
                (user_id, question_id, times_answered, times_correct, streak, average_response_time,
                 ease_factor, interval_days, next_review_at, last_answered_at, needs_review)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id, question_id) DO UPDATE SET
                times_answered = excluded.times_answered,
                times_correct = excluded.times_correct,
                streak = excluded.streak,
                average_response_time = excluded.average_response_time,
                ease_factor = excluded.ease_factor,
                interval_days = excluded.interval_days,
                next_review_at = excluded.next_review_at,
                last_answered_at = excluded.last_answered_at,
                needs_review = excluded.needs_review",
            params![
                stats.user_id,
                stats.question_id,
                stats.times_answered,
                stats.times_correct,
                stats.streak,
                stats.average_response_time,
                stats.ease_factor,
                stats.interval_days,
                stats.next_review_at.timestamp(),
                stats.last_answered_at.map(|t| t.timestamp()),
                stats.needs_review
            ],
        )?;

        self.get_stats(stats.user_id, stats.question_id)?
            .ok_or_else(|| EngineError::not_found("question stats", stats.question_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Connection, i64) {
        let conn = open_in_memory().unwrap();
        let quiz_id = create_quiz(&conn, "Polish basics", Some("Vocabulary")).unwrap();
        (conn, quiz_id)
    }

    #[test]
    fn test_add_flashcard_is_idempotent() {
        let conn = open_in_memory().unwrap();
        let deck_id = create_deck(&conn, "Polish Vocabulary").unwrap();
        let now = Utc::now();

        let first = add_flashcard(&conn, deck_id, "cześć", "hello", now).unwrap();
        let second = add_flashcard(&conn, deck_id, "cześć", "hi", now).unwrap();
        assert_eq!(first, second);

        let deck = get_deck(&conn, deck_id).unwrap().unwrap();
        assert_eq!(deck.flashcards.len(), 1);
        assert_eq!(deck.flashcards[0].back, "hello");
        assert_eq!(deck.flashcards[0].status, CardStatus::New);
    }

    #[test]
    fn test_due_cards_ordered_by_due_date() {
        let conn = open_in_memory().unwrap();
        let deck_id = create_deck(&conn, "Deck").unwrap();
        let now = from_timestamp(1_700_000_000);

        let late = add_flashcard(&conn, deck_id, "b", "b", now).unwrap();
        let early = add_flashcard(&conn, deck_id, "a", "a", now - Duration::days(2)).unwrap();
        let future = add_flashcard(&conn, deck_id, "c", "c", now + Duration::days(1)).unwrap();

        let due: Vec<i64> = conn.due_cards(deck_id, now).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(due, vec![early, late]);
        assert!(!due.contains(&future));
    }

    #[test]
    fn test_question_roundtrip_with_options_and_tags() {
        let (conn, quiz_id) = seeded();
        let mut new_question = NewQuestion::multiple_choice(
            quiz_id,
            "dziękuję means?",
            2,
            &[("please", false), ("thank you", true)],
        );
        new_question.tags = vec!["phrases".to_string()];
        let id = add_question(&conn, &new_question).unwrap();

        let question = conn.get_question(id).unwrap().unwrap();
        assert_eq!(question.difficulty, 2);
        assert_eq!(question.tags, vec!["phrases".to_string()]);
        assert_eq!(question.options.len(), 2);
        assert!(question.options[1].is_correct);

        let quiz = conn.get_quiz(quiz_id).unwrap().unwrap();
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.topic.as_deref(), Some("Vocabulary"));
    }

    #[test]
    fn test_malformed_tags_default_to_empty() {
        let (conn, quiz_id) = seeded();
        let id = add_question(&conn, &NewQuestion::short_answer(quiz_id, "proszę?", 1, "please"))
            .unwrap();
        conn.execute(
            "UPDATE questions SET tags = 'not json' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let question = conn.get_question(id).unwrap().unwrap();
        assert!(question.tags.is_empty());
    }

    #[test]
    fn test_add_question_rejects_bad_difficulty() {
        let (conn, quiz_id) = seeded();
        let result = add_question(&conn, &NewQuestion::short_answer(quiz_id, "?", 6, "x"));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_stats_upsert_keeps_one_row() {
        let (conn, quiz_id) = seeded();
        let qid = add_question(&conn, &NewQuestion::short_answer(quiz_id, "?", 1, "x")).unwrap();
        let now = Utc::now();
        let mut stats = UserQuestionStats {
            id: 0,
            user_id: 1,
            question_id: qid,
            times_answered: 1,
            times_correct: 1,
            streak: 1,
            average_response_time: 4.0,
            ease_factor: 2.5,
            interval_days: 0,
            next_review_at: now,
            last_answered_at: Some(now),
            needs_review: false,
        };

        let first = conn.upsert_stats(&stats).unwrap();
        stats.times_answered = 2;
        let second = conn.upsert_stats(&stats).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.times_answered, 2);
        assert_eq!(conn.stats_for_user(1).unwrap().len(), 1);
    }

    #[test]
    fn test_seed_runs_once() {
        let conn = open_in_memory().unwrap();
        assert!(seed_sample_data(&conn, Utc::now()).unwrap());
        assert!(!seed_sample_data(&conn, Utc::now()).unwrap());

        let decks = load_all_decks(&conn).unwrap();
        assert_eq!(decks.len(), 1);
        assert_eq!(decks[0].flashcards.len(), 3);
        assert_eq!(deck_id_by_name(&conn, "Polish Vocabulary").unwrap(), Some(decks[0].id));
    }

    #[test]
    fn test_advance_day() {
        let conn = open_in_memory().unwrap();
        let start = from_timestamp(1_700_000_000);
        set_current_date(&conn, start).unwrap();

        let next = advance_day(&conn).unwrap();
        assert_eq!(next - start, Duration::days(1));
        assert_eq!(get_current_date(&conn).unwrap(), next);
    }

    #[test]
    fn test_corrupt_current_date_is_an_error() {
        let conn = open_in_memory().unwrap();
        conn.execute(
            "UPDATE app_state SET value = 'yesterday' WHERE key = 'current_date'",
            [],
        )
        .unwrap();

        assert!(matches!(get_current_date(&conn), Err(EngineError::InvalidState(_))));
        assert!(advance_day(&conn).is_err());
    }
}
