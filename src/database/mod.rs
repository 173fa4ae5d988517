pub mod db;
pub mod store;

pub use store::{
    AttemptStore, CardStore, QuestionStore, QuizStore, ResponseHistoryRow, ResponseStore,
    StatsStore,
};
