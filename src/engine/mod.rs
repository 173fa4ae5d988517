//! Review scheduling and difficulty adaptation.
pub mod adaptive;
pub mod grading;
pub mod practice;
pub mod priority;
pub mod scheduler;
pub mod stats;

pub use adaptive::{AdaptiveQuizController, AnswerOutcome, StartedAttempt};
pub use priority::{ReviewLabel, ReviewQueueItem};
