pub mod card_review;
pub mod deck;
pub mod flashcard;
pub mod question;
pub mod question_stats;
pub mod quiz_attempt;
pub mod sm2;

pub use card_review::CardReviewRecord;
pub use deck::Deck;
pub use flashcard::{CardStatus, Flashcard};
pub use question::{Answer, AnswerOption, PromptOption, Question, QuestionKind, QuestionPrompt, Quiz};
pub use question_stats::UserQuestionStats;
pub use quiz_attempt::{AttemptMode, AttemptStatus, QuizAttempt, QuizResponse};
pub use sm2::{Quality, Sm2State};
