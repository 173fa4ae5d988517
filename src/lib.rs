pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod export;
pub mod models;
pub mod service;

pub use config::{ClockMode, EngineConfig};
pub use error::{EngineError, Result};
pub use models::{Deck, Flashcard, Question, QuizAttempt, UserQuestionStats};
pub use service::StudyService;
