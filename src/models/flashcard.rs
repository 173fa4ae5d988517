//! Flashcard is a <front, back> pair plus its spaced repetition scheduling fields.
use super::sm2::{DEFAULT_EASE_FACTOR, Sm2State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl CardStatus {
    /// Status after a review, derived from the consecutive-correct count.
    pub fn from_repetitions(repetitions: i32) -> Self {
        match repetitions {
            r if r <= 0 => CardStatus::Learning,
            r if r < 3 => CardStatus::Reviewing,
            _ => CardStatus::Mastered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::New => "new",
            CardStatus::Learning => "learning",
            CardStatus::Reviewing => "reviewing",
            CardStatus::Mastered => "mastered",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "learning" => CardStatus::Learning,
            "reviewing" => CardStatus::Reviewing,
            "mastered" => CardStatus::Mastered,
            _ => CardStatus::New,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: i64,
    pub deck_id: i64,
    pub front: String,
    pub back: String,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub repetitions: i32,
    pub due_at: DateTime<Utc>,
    pub status: CardStatus,
}

impl Flashcard {
    /// A card that has never been reviewed, due immediately.
    pub fn new(deck_id: i64, front: &str, back: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            deck_id,
            front: front.to_string(),
            back: back.to_string(),
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            due_at: now,
            status: CardStatus::New,
        }
    }

    pub fn sm2_state(&self) -> Sm2State {
        Sm2State {
            ease_factor: self.ease_factor,
            interval_days: self.interval_days,
            repetitions: self.repetitions,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_flashcard_creation() {
        let now = Utc::now();
        let card = Flashcard::new(1, "hello", "cześć", now);

        assert_eq!(card.front, "hello");
        assert_eq!(card.back, "cześć");
        assert_eq!(card.ease_factor, 2.5);
        assert_eq!(card.interval_days, 0);
        assert_eq!(card.status, CardStatus::New);
        assert!(card.is_due(now));
        assert!(!card.is_due(now - Duration::seconds(1)));
    }

    #[test]
    fn test_status_from_repetitions() {
        assert_eq!(CardStatus::from_repetitions(0), CardStatus::Learning);
        assert_eq!(CardStatus::from_repetitions(1), CardStatus::Reviewing);
        assert_eq!(CardStatus::from_repetitions(2), CardStatus::Reviewing);
        assert_eq!(CardStatus::from_repetitions(3), CardStatus::Mastered);
        assert_eq!(CardStatus::from_repetitions(12), CardStatus::Mastered);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            CardStatus::New,
            CardStatus::Learning,
            CardStatus::Reviewing,
            CardStatus::Mastered,
        ] {
            assert_eq!(CardStatus::parse(status.as_str()), status);
        }
    }
}
