//! "What to review next" across a learner's whole response history.
//!
//! Every question the learner has answered in a completed attempt gets an
//! additive priority score:
//!
//! | signal                                      | points |
//! |---------------------------------------------|--------|
//! | last answer was wrong                       | 50     |
//! | topic accuracy below 70%                    | 30     |
//! | last answered more than 3 days ago          | 20     |
//! | average response time in (0, 3) seconds     | 10     |
//! | answered fewer than 3 times                 | 15     |
//! | question accuracy below 50%                 | 25     |
//!
//! Questions scoring 0 are left out. The rest are ranked by score, then by the
//! oldest last answer. The history is rescanned in full on every call.

use crate::database::{QuestionStore, ResponseHistoryRow, ResponseStore};
use crate::error::Result;
use crate::models::Question;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_QUEUE_LIMIT: usize = 20;
pub const DEFAULT_TOPIC: &str = "General";

const WRONG_LAST_POINTS: u32 = 50;
const WEAK_TOPIC_POINTS: u32 = 30;
const STALE_POINTS: u32 = 20;
const FAST_GUESS_POINTS: u32 = 10;
const FEW_ATTEMPTS_POINTS: u32 = 15;
const LOW_ACCURACY_POINTS: u32 = 25;

const WEAK_TOPIC_ACCURACY: f64 = 70.0;
const LOW_QUESTION_ACCURACY: f64 = 50.0;
const STALE_AFTER_DAYS: i64 = 3;
const FAST_GUESS_SECONDS: f64 = 3.0;
const FEW_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReviewLabel {
    #[serde(rename = "Needs Review")]
    NeedsReview,
    #[serde(rename = "Weak Topic")]
    WeakTopic,
    #[serde(rename = "Due for Review")]
    DueForReview,
}

impl fmt::Display for ReviewLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReviewLabel::NeedsReview => "Needs Review",
            ReviewLabel::WeakTopic => "Weak Topic",
            ReviewLabel::DueForReview => "Due for Review",
        };
        f.pad(label)
    }
}

/// Aggregated history of one question for one learner.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionSummary {
    pub question_id: i64,
    pub topic: String,
    pub quiz_title: String,
    pub times_answered: u32,
    pub times_correct: u32,
    pub last_answered_at: DateTime<Utc>,
    pub last_was_correct: bool,
    pub average_response_time: f64,
}

impl QuestionSummary {
    pub fn accuracy(&self) -> f64 {
        percent(self.times_correct, self.times_answered)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TopicTally {
    pub correct: u32,
    pub total: u32,
}

impl TopicTally {
    pub fn accuracy(&self) -> f64 {
        percent(self.correct, self.total)
    }
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// The question's own topic, else its first tag, else the quiz topic, else "General".
pub fn resolve_topic(row: &ResponseHistoryRow) -> String {
    [
        row.question_topic.as_deref(),
        row.tags.first().map(String::as_str),
        row.quiz_topic.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|t| !t.is_empty())
    .unwrap_or(DEFAULT_TOPIC)
    .to_string()
}

/// Folds the raw history into one summary per question, ordered by question id.
pub fn summarize(history: &[ResponseHistoryRow]) -> Vec<QuestionSummary> {
    let mut by_question: HashMap<i64, (QuestionSummary, i64, f64)> = HashMap::new();

    for row in history {
        let response_time = if row.response_time.is_finite() && row.response_time >= 0.0 {
            row.response_time
        } else {
            warn!("Ignoring invalid response time on response {}", row.response_id);
            0.0
        };

        let entry = by_question.entry(row.question_id).or_insert_with(|| {
            (
                QuestionSummary {
                    question_id: row.question_id,
                    topic: resolve_topic(row),
                    quiz_title: row.quiz_title.clone(),
                    times_answered: 0,
                    times_correct: 0,
                    last_answered_at: row.answered_at,
                    last_was_correct: row.is_correct,
                    average_response_time: 0.0,
                },
                row.response_id,
                0.0,
            )
        });
        let (summary, latest_response, total_time) = entry;

        summary.times_answered += 1;
        if row.is_correct {
            summary.times_correct += 1;
        }
        *total_time += response_time;

        let newer = (row.answered_at, row.response_id) >= (summary.last_answered_at, *latest_response);
        if newer {
            summary.last_answered_at = row.answered_at;
            summary.last_was_correct = row.is_correct;
            *latest_response = row.response_id;
        }
    }

    let mut summaries: Vec<QuestionSummary> = by_question
        .into_values()
        .map(|(mut summary, _, total_time)| {
            summary.average_response_time = total_time / summary.times_answered as f64;
            summary
        })
        .collect();
    summaries.sort_by_key(|s| s.question_id);
    summaries
}

pub fn topic_tallies(summaries: &[QuestionSummary]) -> HashMap<String, TopicTally> {
    let mut tallies: HashMap<String, TopicTally> = HashMap::new();
    for summary in summaries {
        let tally = tallies.entry(summary.topic.clone()).or_default();
        tally.correct += summary.times_correct;
        tally.total += summary.times_answered;
    }
    tallies
}

/// Additive priority score of one question.
pub fn priority_score(summary: &QuestionSummary, topic_accuracy: f64, now: DateTime<Utc>) -> u32 {
    let mut score = 0;

    if !summary.last_was_correct {
        score += WRONG_LAST_POINTS;
    }
    if topic_accuracy < WEAK_TOPIC_ACCURACY {
        score += WEAK_TOPIC_POINTS;
    }
    if (now - summary.last_answered_at).num_days() > STALE_AFTER_DAYS {
        score += STALE_POINTS;
    }
    if summary.average_response_time > 0.0 && summary.average_response_time < FAST_GUESS_SECONDS {
        score += FAST_GUESS_POINTS;
    }
    if summary.times_answered < FEW_ATTEMPTS {
        score += FEW_ATTEMPTS_POINTS;
    }
    if summary.accuracy() < LOW_QUESTION_ACCURACY {
        score += LOW_ACCURACY_POINTS;
    }

    score
}

pub fn label_for(summary: &QuestionSummary, topic_accuracy: f64) -> ReviewLabel {
    if !summary.last_was_correct {
        ReviewLabel::NeedsReview
    } else if topic_accuracy < WEAK_TOPIC_ACCURACY {
        ReviewLabel::WeakTopic
    } else {
        ReviewLabel::DueForReview
    }
}

/// A scored question before it is hydrated with its content.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedCandidate {
    pub summary: QuestionSummary,
    pub topic_accuracy: f64,
    pub priority_score: u32,
    pub label: ReviewLabel,
}

/// Scores every answered question, drops those scoring 0, and sorts the rest.
pub fn rank(history: &[ResponseHistoryRow], now: DateTime<Utc>) -> Vec<RankedCandidate> {
    let summaries = summarize(history);
    let tallies = topic_tallies(&summaries);

    let mut ranked: Vec<RankedCandidate> = summaries
        .into_iter()
        .filter_map(|summary| {
            let topic_accuracy = tallies
                .get(&summary.topic)
                .map(TopicTally::accuracy)
                .unwrap_or_default();
            let priority_score = priority_score(&summary, topic_accuracy, now);
            if priority_score == 0 {
                return None;
            }
            Some(RankedCandidate {
                label: label_for(&summary, topic_accuracy),
                summary,
                topic_accuracy,
                priority_score,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.priority_score
            .cmp(&a.priority_score)
            .then(a.summary.last_answered_at.cmp(&b.summary.last_answered_at))
            .then(a.summary.question_id.cmp(&b.summary.question_id))
    });
    ranked
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewQueueItem {
    pub question: Question,
    pub topic: String,
    pub quiz_title: String,
    pub priority_score: u32,
    pub label: ReviewLabel,
    /// Accuracy on this question, as a percentage.
    pub accuracy: f64,
    pub topic_accuracy: f64,
    pub times_answered: u32,
    pub last_answered_at: DateTime<Utc>,
}

/// Builds the ranked review queue for a learner, hydrating the top `limit` questions.
pub fn build_queue<S: ResponseStore + QuestionStore + ?Sized>(
    store: &S,
    user_id: i64,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<ReviewQueueItem>> {
    let history = store.history_for_user(user_id)?;
    let ranked = rank(&history, now);
    debug!(
        "Review queue for user {}: {} responses, {} candidates",
        user_id,
        history.len(),
        ranked.len()
    );

    let mut queue = Vec::with_capacity(limit.min(ranked.len()));
    for candidate in ranked {
        if queue.len() >= limit {
            break;
        }
        let Some(question) = store.get_question(candidate.summary.question_id)? else {
            warn!(
                "Question {} vanished while building review queue, skipping",
                candidate.summary.question_id
            );
            continue;
        };
        queue.push(ReviewQueueItem {
            question,
            accuracy: candidate.summary.accuracy(),
            topic: candidate.summary.topic,
            quiz_title: candidate.summary.quiz_title,
            priority_score: candidate.priority_score,
            label: candidate.label,
            topic_accuracy: candidate.topic_accuracy,
            times_answered: candidate.summary.times_answered,
            last_answered_at: candidate.summary.last_answered_at,
        });
    }

    Ok(queue)
}
