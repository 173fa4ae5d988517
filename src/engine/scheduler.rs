//! Flashcard rescheduling after a quality rating.

use crate::database::CardStore;
use crate::error::{EngineError, Result};
use crate::models::sm2::{self, Quality};
use crate::models::{CardReviewRecord, CardStatus, Flashcard};
use chrono::{DateTime, Duration, Utc};
use log::info;

/// Applies one SM-2 review to a card, returning the updated card and its audit record.
pub fn apply_review(
    card: &Flashcard,
    quality: Quality,
    now: DateTime<Utc>,
) -> (Flashcard, CardReviewRecord) {
    let next = sm2::next_state(card.sm2_state(), quality);

    let updated = Flashcard {
        ease_factor: next.ease_factor,
        interval_days: next.interval_days,
        repetitions: next.repetitions,
        due_at: now + Duration::days(next.interval_days as i64),
        status: CardStatus::from_repetitions(next.repetitions),
        ..card.clone()
    };

    let record = CardReviewRecord {
        id: 0,
        card_id: card.id,
        quality: quality.value(),
        interval_before: card.interval_days,
        interval_after: updated.interval_days,
        ease_before: card.ease_factor,
        ease_after: updated.ease_factor,
        reviewed_at: now,
    };

    (updated, record)
}

/// Validates the rating, reschedules the card and appends the review to its audit trail.
pub fn review_card<S: CardStore + ?Sized>(
    store: &S,
    card_id: i64,
    quality: i64,
    now: DateTime<Utc>,
) -> Result<Flashcard> {
    let quality = Quality::new(quality)?;
    let card = store
        .get_card(card_id)?
        .ok_or_else(|| EngineError::not_found("card", card_id))?;

    let (updated, record) = apply_review(&card, quality, now);
    store.save_card(&updated)?;
    store.append_review(&record)?;

    info!(
        "Reviewed card {} | Quality: {} | Interval: {} -> {} days | Ease: {:.2} -> {:.2} | Status: {}",
        card.id,
        quality.value(),
        record.interval_before,
        record.interval_after,
        record.ease_before,
        record.ease_after,
        updated.status.as_str()
    );

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db;

    fn card(repetitions: i32, interval_days: i32, ease_factor: f64) -> Flashcard {
        Flashcard {
            repetitions,
            interval_days,
            ease_factor,
            status: CardStatus::from_repetitions(repetitions),
            ..Flashcard::new(1, "cześć", "hello", Utc::now())
        }
    }

    fn q(v: i64) -> Quality {
        Quality::new(v).unwrap()
    }

    #[test]
    fn test_pass_after_two_repetitions_multiplies_interval() {
        let now = Utc::now();
        let (updated, record) = apply_review(&card(2, 6, 2.5), q(4), now);

        assert_eq!(updated.interval_days, 15);
        assert_eq!(updated.repetitions, 3);
        assert!((updated.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(updated.due_at, now + Duration::days(15));
        assert_eq!(record.interval_before, 6);
        assert_eq!(record.interval_after, 15);
    }

    #[test]
    fn test_second_pass_sets_six_days() {
        let (updated, _) = apply_review(&card(1, 1, 2.5), q(4), Utc::now());
        assert_eq!(updated.interval_days, 6);
        assert_eq!(updated.repetitions, 2);
        assert_eq!(updated.status, CardStatus::Reviewing);
    }

    #[test]
    fn test_failure_resets_to_learning() {
        let now = Utc::now();
        let (updated, record) = apply_review(&card(1, 6, 2.5), q(2), now);

        assert_eq!(updated.repetitions, 0);
        assert_eq!(updated.interval_days, 1);
        assert_eq!(updated.ease_factor, 2.5);
        assert_eq!(updated.status, CardStatus::Learning);
        assert_eq!(updated.due_at, now + Duration::days(1));
        assert_eq!(record.quality, 2);
    }

    #[test]
    fn test_status_follows_repetitions_over_a_sequence() {
        let mut current = card(0, 0, 2.5);
        for rating in [5, 4, 3, 1, 4, 4, 4, 5, 0] {
            current = apply_review(&current, q(rating), Utc::now()).0;
            assert_eq!(current.status, CardStatus::from_repetitions(current.repetitions));
            assert!(current.ease_factor >= sm2::MIN_EASE_FACTOR);
        }
    }

    #[test]
    fn test_review_card_persists_and_audits() {
        let conn = db::open_in_memory().unwrap();
        let deck_id = db::create_deck(&conn, "Polish Vocabulary").unwrap();
        let now = Utc::now();
        let card_id = db::add_flashcard(&conn, deck_id, "proszę", "please", now).unwrap();

        let updated = review_card(&conn, card_id, 5, now).unwrap();
        assert_eq!(updated.repetitions, 1);
        assert_eq!(updated.status, CardStatus::Reviewing);

        let stored = conn.get_card(card_id).unwrap().unwrap();
        assert_eq!(stored.interval_days, 1);

        let history = conn.reviews_for_card(card_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].interval_before, 0);
        assert_eq!(history[0].interval_after, 1);
    }

    #[test]
    fn test_review_card_rejects_bad_quality_before_mutation() {
        let conn = db::open_in_memory().unwrap();
        let deck_id = db::create_deck(&conn, "Deck").unwrap();
        let card_id = db::add_flashcard(&conn, deck_id, "a", "b", Utc::now()).unwrap();

        let err = review_card(&conn, card_id, 6, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(conn.reviews_for_card(card_id).unwrap().is_empty());
        assert_eq!(conn.get_card(card_id).unwrap().unwrap().status, CardStatus::New);
    }

    #[test]
    fn test_review_unknown_card() {
        let conn = db::open_in_memory().unwrap();
        let err = review_card(&conn, 404, 3, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "card", id: 404 }));
    }
}
