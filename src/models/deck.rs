//! A named deck of flashcards, also the JSON export format.
use super::Flashcard;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deck {
    /// Database id; exported files carry none.
    #[serde(default, skip_serializing_if = "is_unsaved")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

fn is_unsaved(id: &i64) -> bool {
    *id == 0
}

impl Deck {
    /// A copy with deck and card ids cleared, for writing to a file.
    pub fn without_ids(&self) -> Deck {
        Deck {
            id: 0,
            name: self.name.clone(),
            flashcards: self
                .flashcards
                .iter()
                .map(|card| Flashcard {
                    id: 0,
                    deck_id: 0,
                    ..card.clone()
                })
                .collect(),
        }
    }
}
