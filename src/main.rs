use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use serde::Serialize;
use std::path::PathBuf;
use study_engine::engine::ReviewQueueItem;
use study_engine::models::{Answer, AttemptMode, QuestionPrompt};
use study_engine::{EngineConfig, StudyService};

#[derive(Parser)]
#[command(name = "study-engine", about = "Flashcard and adaptive quiz study tracker", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Practice,
    Exam,
    Adaptive,
}

impl From<ModeArg> for AttemptMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Practice => AttemptMode::Practice,
            ModeArg::Exam => AttemptMode::Exam,
            ModeArg::Adaptive => AttemptMode::Adaptive,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load the sample deck and quiz into an empty database
    Seed,

    /// Rate a flashcard 0-5
    ReviewCard { card_id: i64, quality: i64 },

    /// List cards due in a deck
    DueCards { deck_id: i64 },

    /// Show past reviews of a card
    CardHistory { card_id: i64 },

    /// Start a quiz attempt
    StartQuiz {
        quiz_id: i64,
        #[arg(long)]
        user: i64,
        #[arg(long, value_enum, default_value = "adaptive")]
        mode: ModeArg,
    },

    /// Answer a question in an attempt
    Answer {
        attempt_id: i64,
        question_id: i64,
        /// Chosen option id
        #[arg(long, conflicts_with = "text")]
        option: Option<i64>,
        /// Free-text answer
        #[arg(long)]
        text: Option<String>,
        /// Seconds taken to answer
        #[arg(long, default_value = "0")]
        time: f64,
    },

    /// Close a practice or exam attempt and score it
    Finish { attempt_id: i64 },

    /// Show the spaced review queue
    Queue {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rate recall of a question from the review queue
    Rate { stats_id: i64, quality: i64 },

    /// Show per-question statistics for a user
    Stats {
        #[arg(long)]
        user: i64,
    },

    /// Move the simulated date one day forward
    AdvanceDay,

    /// Write a deck to a JSON file
    ExportDeck { deck_id: i64, path: PathBuf },

    /// Read a deck from a JSON file
    ImportDeck { path: PathBuf },
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, plain: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Plain => plain(value),
    }
    Ok(())
}

fn print_question(question: &QuestionPrompt) {
    println!("[{}] (difficulty {}) {}", question.id, question.difficulty, question.text);
    for option in &question.options {
        println!("    {}) {}", option.id, option.text);
    }
}

fn print_queue_item(item: &ReviewQueueItem) {
    println!(
        "{:>4}  {:<13} q{} [{}] {} (accuracy {:.0}%, topic {:.0}%)",
        item.priority_score,
        item.label,
        item.question.id,
        item.topic,
        item.question.text,
        item.accuracy,
        item.topic_accuracy
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    let service = StudyService::open(config).context("opening database")?;
    let format = cli.format;

    match cli.command {
        Command::Seed => {
            let seeded = service.seed()?;
            let decks = service.decks()?;
            emit(format, &decks, |decks| {
                if seeded {
                    println!("Sample data created!");
                }
                println!("Loaded {} decks from database", decks.len());
                for deck in decks {
                    println!("  - [{}] {} ({} cards)", deck.id, deck.name, deck.flashcards.len());
                }
            })?;
        }
        Command::ReviewCard { card_id, quality } => {
            let card = service.review_card(card_id, quality)?;
            emit(format, &card, |card| {
                println!(
                    "{} -> next review in {} day(s) on {} ({})",
                    card.front,
                    card.interval_days,
                    card.due_at.format("%Y-%m-%d"),
                    card.status.as_str()
                );
            })?;
        }
        Command::DueCards { deck_id } => {
            let cards = service.due_cards(deck_id)?;
            emit(format, &cards, |cards| {
                if cards.is_empty() {
                    println!("No cards due.");
                }
                for card in cards {
                    println!("[{}] {} / {}", card.id, card.front, card.back);
                }
            })?;
        }
        Command::CardHistory { card_id } => {
            let history = service.card_history(card_id)?;
            emit(format, &history, |history| {
                for review in history {
                    println!(
                        "{}  quality {}  interval {} -> {}  ease {:.2} -> {:.2}",
                        review.reviewed_at.format("%Y-%m-%d"),
                        review.quality,
                        review.interval_before,
                        review.interval_after,
                        review.ease_before,
                        review.ease_after
                    );
                }
            })?;
        }
        Command::StartQuiz { quiz_id, user, mode } => match AttemptMode::from(mode) {
            AttemptMode::Adaptive => {
                let started = service.start_adaptive_attempt(quiz_id, user)?;
                emit(format, &started, |started| {
                    println!("Attempt {} started", started.attempt.id);
                    match &started.first_question {
                        Some(question) => print_question(question),
                        None => println!("Quiz has no questions."),
                    }
                })?;
            }
            mode => {
                let attempt = service.start_attempt(quiz_id, user, mode)?;
                emit(format, &attempt, |attempt| {
                    println!("Attempt {} started ({})", attempt.id, attempt.mode.as_str());
                })?;
            }
        },
        Command::Answer {
            attempt_id,
            question_id,
            option,
            text,
            time,
        } => {
            let answer = match (option, text) {
                (Some(id), None) => Answer::Choice(id),
                (None, Some(text)) => Answer::Text(text),
                _ => bail!("give exactly one of --option or --text"),
            };
            let attempt_mode = service.attempt(attempt_id)?.mode;
            if attempt_mode == AttemptMode::Adaptive {
                let outcome = service.submit_adaptive_answer(attempt_id, question_id, &answer, time)?;
                emit(format, &outcome, |outcome| {
                    println!(
                        "{} (difficulty now {})",
                        if outcome.is_correct { "Correct" } else { "Incorrect" },
                        outcome.current_difficulty
                    );
                    if let Some(score) = outcome.score {
                        println!("Attempt complete, score {score}%");
                    } else if let Some(question) = &outcome.next_question {
                        print_question(question);
                    }
                })?;
            } else {
                let response = service.submit_answer(attempt_id, question_id, &answer, time)?;
                emit(format, &response, |response| {
                    println!(
                        "{} ({} marks)",
                        if response.is_correct { "Correct" } else { "Incorrect" },
                        response.marks_awarded
                    );
                })?;
            }
        }
        Command::Finish { attempt_id } => {
            let attempt = service.finish_attempt(attempt_id)?;
            emit(format, &attempt, |attempt| {
                println!("Attempt {} score {}%", attempt.id, attempt.score.unwrap_or(0));
            })?;
        }
        Command::Queue { user, limit } => {
            let queue = service.get_spaced_review_queue(user, limit)?;
            emit(format, &queue, |queue| {
                if queue.is_empty() {
                    println!("Nothing to review.");
                }
                queue.iter().for_each(print_queue_item);
            })?;
        }
        Command::Rate { stats_id, quality } => {
            let stats = service.submit_spaced_review(stats_id, quality)?;
            emit(format, &stats, |stats| {
                println!(
                    "Question {} next review in {} day(s) on {}",
                    stats.question_id,
                    stats.interval_days,
                    stats.next_review_at.format("%Y-%m-%d")
                );
            })?;
        }
        Command::Stats { user } => {
            let rows = service.question_stats(user)?;
            emit(format, &rows, |rows| {
                for row in rows {
                    println!(
                        "[{}] question {}  {}/{} correct  streak {}  due {}{}",
                        row.id,
                        row.question_id,
                        row.times_correct,
                        row.times_answered,
                        row.streak,
                        row.next_review_at.format("%Y-%m-%d"),
                        if row.needs_review { "  needs review" } else { "" }
                    );
                }
            })?;
        }
        Command::AdvanceDay => {
            let date = service.advance_day()?;
            emit(format, &date, |date| println!("Current date: {}", date.format("%Y-%m-%d")))?;
        }
        Command::ExportDeck { deck_id, path } => {
            service.export_deck(deck_id, &path)?;
            emit(format, &path, |path| println!("Exported to {}", path.display()))?;
        }
        Command::ImportDeck { path } => {
            let deck = service.import_deck(&path)?;
            emit(format, &deck, |deck| {
                println!("Imported '{}' ({} cards)", deck.name, deck.flashcards.len());
            })?;
        }
    }
    Ok(())
}
