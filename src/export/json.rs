//! JSON import/export for flashcard decks.
//! Decks are written with their cards' scheduling fields; importing creates fresh, unreviewed cards.

use crate::database::db;
use crate::error::{EngineError, Result};
use crate::models::Deck;
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Exports a deck to a pretty-printed JSON file at the specified path.
/// Database ids are left out; an imported deck gets fresh ones.
pub fn export_deck_to_path(deck: &Deck, path: &Path) -> Result<()> {
    let json_string = serde_json::to_string_pretty(&deck.without_ids())?;
    fs::write(path, json_string)?;
    info!("Deck '{}' exported to '{}'", deck.name, path.display());
    Ok(())
}

/// Reads a deck from a JSON file.
pub fn read_deck(path: &Path) -> Result<Deck> {
    let contents = fs::read_to_string(path)?;
    let deck: Deck = serde_json::from_str(&contents)?;
    Ok(deck)
}

/// Stores an imported deck, adding its cards to an existing deck of the same name if there is one.
pub fn import_deck(conn: &Connection, deck: &Deck, now: DateTime<Utc>) -> Result<Deck> {
    let deck_id = match db::deck_id_by_name(conn, &deck.name)? {
        Some(id) => id,
        None => db::create_deck(conn, &deck.name)?,
    };

    for card in &deck.flashcards {
        db::add_flashcard(conn, deck_id, &card.front, &card.back, now)?;
    }

    let stored =
        db::get_deck(conn, deck_id)?.ok_or_else(|| EngineError::not_found("deck", deck_id))?;
    info!(
        "Deck '{}' imported with {} cards",
        stored.name,
        stored.flashcards.len()
    );
    Ok(stored)
}
