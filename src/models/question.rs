//! Quiz questions, their answer options, and answer grading.
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::ShortAnswer => "short_answer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multiple_choice" | "mcq" => Some(QuestionKind::MultipleChoice),
            "true_false" => Some(QuestionKind::TrueFalse),
            "short_answer" | "free_text" => Some(QuestionKind::ShortAnswer),
            _ => None,
        }
    }

    /// Option-based questions are graded against the option flagged correct.
    pub fn uses_options(&self) -> bool {
        !matches!(self, QuestionKind::ShortAnswer)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<AnswerOption>,
    pub reference_answer: Option<String>,
    pub difficulty: u8,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub marks: i32,
}

/// A learner's answer payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Choice(i64),
    Text(String),
}

impl Question {
    /// Grades an answer. Payloads that do not fit the question kind are rejected.
    pub fn grade(&self, answer: &Answer) -> Result<bool> {
        match (self.kind.uses_options(), answer) {
            (true, Answer::Choice(option_id)) => self
                .options
                .iter()
                .find(|o| o.id == *option_id)
                .map(|o| o.is_correct)
                .ok_or_else(|| {
                    EngineError::InvalidInput(format!(
                        "option {option_id} does not belong to question {}",
                        self.id
                    ))
                }),
            (false, Answer::Text(text)) => Ok(self
                .reference_answer
                .as_deref()
                .is_some_and(|reference| {
                    reference.trim().to_lowercase() == text.trim().to_lowercase()
                })),
            (true, Answer::Text(_)) => Err(EngineError::InvalidInput(format!(
                "question {} expects a selected option",
                self.id
            ))),
            (false, Answer::Choice(_)) => Err(EngineError::InvalidInput(format!(
                "question {} expects a text answer",
                self.id
            ))),
        }
    }

    pub fn marks_for(&self, is_correct: bool) -> i32 {
        if is_correct { self.marks } else { 0 }
    }

    /// The question as shown to a learner, without the answer key.
    pub fn prompt(&self) -> QuestionPrompt {
        QuestionPrompt {
            id: self.id,
            quiz_id: self.quiz_id,
            text: self.text.clone(),
            kind: self.kind,
            options: self
                .options
                .iter()
                .map(|o| PromptOption {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
            difficulty: self.difficulty,
            topic: self.topic.clone(),
            tags: self.tags.clone(),
            marks: self.marks,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PromptOption {
    pub id: i64,
    pub text: String,
}

/// A question being asked: no correct-option flags, no reference answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionPrompt {
    pub id: i64,
    pub quiz_id: i64,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<PromptOption>,
    pub difficulty: u8,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub marks: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub topic: Option<String>,
    pub questions: Vec<Question>,
}
