use std::fmt;
use std::io::{BufRead, Write as _};
use std::sync::Arc;

use quiz_core::model::{Catalog, QuestionDraft, QuestionId};
use quiz_core::weights::WeightEngine;
use serde::Deserialize;
use services::{ProgressOverview, QuizService, answer_options};
use storage::repository::{Storage, StorageError};

/// Questions per chunk when seeding.
const QUESTIONS_PER_CHUNK: usize = 10;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- quiz     [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- seed     [--db <sqlite_url>] [--file <questions.json>]");
    eprintln!("  cargo run -p app -- stats    [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- progress [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- reset    [--db <sqlite_url>] [--yes]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:quiz.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quiz,
    Seed,
    Stats,
    Progress,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "quiz" => Some(Self::Quiz),
            "seed" => Some(Self::Seed),
            "stats" => Some(Self::Stats),
            "progress" => Some(Self::Progress),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    seed_file: Option<String>,
    assume_yes: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(
                || normalize_sqlite_url("sqlite:quiz.sqlite3".into()),
                normalize_sqlite_url,
            );
        let mut seed_file = None;
        let mut assume_yes = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--file" => {
                    seed_file = Some(require_value(args, "--file")?);
                }
                "--yes" => {
                    assume_yes = true;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            seed_file,
            assume_yes,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: start a quiz when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Quiz,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Quiz,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url, WeightEngine::new()).await?;

    match cmd {
        Command::Quiz => run_quiz(&storage).await,
        Command::Seed => run_seed(&storage, parsed.seed_file.as_deref()).await,
        Command::Stats => run_stats(&storage).await,
        Command::Progress => run_progress(&storage).await,
        Command::Reset => run_reset(&storage, parsed.assume_yes).await,
    }
}

async fn load_catalog_or_hint(storage: &Storage) -> Result<Catalog, Box<dyn std::error::Error>> {
    match storage.catalog.load_catalog().await {
        Ok(catalog) => Ok(catalog),
        Err(StorageError::Catalog(err)) => {
            eprintln!("no usable question catalog ({err}); run `seed` first");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_quiz(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog_or_hint(storage).await?;
    let service = QuizService::new(catalog, Arc::clone(&storage.stats));
    let mut rng = rand::rng();

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    println!("Answer with the option number or the full answer. Enter q to quit.");
    println!();

    loop {
        let question = service.next_question(&mut rng).await?;
        let options = answer_options(&question, &mut rng);

        println!("[chunk {}] {}", question.chunk() + 1, question.prompt());
        for (idx, option) in options.iter().enumerate() {
            println!("  {}) {option}", idx + 1);
        }
        print!("> ");
        std::io::stdout().flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let entry = line.trim();
        if entry.eq_ignore_ascii_case("q") || entry.eq_ignore_ascii_case("quit") {
            break;
        }

        // A bare option number submits that option's text.
        let submitted = match entry.parse::<usize>() {
            Ok(n) if n >= 1 && n <= options.len() => options[n - 1].as_str(),
            _ => entry,
        };

        let outcome = service.submit_answer(question.id(), submitted).await?;
        if outcome.was_correct {
            println!("Correct!");
        } else {
            println!("Incorrect. The answer is: {}", question.answer());
        }
        if outcome.chunk_advanced {
            let overview = service.progress_overview().await?;
            println!("{}", describe_new_unlock(&overview));
        }
        println!();
    }

    println!("Session over.");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SeedQuestion {
    prompt: String,
    answer: String,
    #[serde(default)]
    distractors: Vec<String>,
}

/// Starter catalog used when `seed` is run without `--file`.
const SAMPLE_QUESTIONS: &[(&str, &str, [&str; 3])] = &[
    (
        "What is the capital of Mexico?",
        "Mexico City",
        ["Guadalajara", "Monterrey", "Puebla"],
    ),
    (
        "In what year did Mexico gain independence from Spain?",
        "1821",
        ["1810", "1836", "1848"],
    ),
    (
        "Which ancient city is famous for the Pyramid of the Sun?",
        "Teotihuacan",
        ["Chichen Itza", "Tulum", "Palenque"],
    ),
    (
        "What is the currency of Mexico?",
        "Peso",
        ["Real", "Bolivar", "Colon"],
    ),
    (
        "Which peninsula is home to the ruins of Chichen Itza?",
        "Yucatan",
        ["Baja California", "Iberian", "Kamchatka"],
    ),
    (
        "Who painted the murals in the National Palace?",
        "Diego Rivera",
        ["Frida Kahlo", "Jose Clemente Orozco", "Rufino Tamayo"],
    ),
    (
        "What holiday honors deceased loved ones in early November?",
        "Day of the Dead",
        ["Cinco de Mayo", "Las Posadas", "Carnival"],
    ),
    (
        "Which empire did Hernan Cortes conquer in 1521?",
        "Aztec",
        ["Inca", "Maya", "Olmec"],
    ),
    (
        "What river forms much of Mexico's northern border?",
        "Rio Grande",
        ["Usumacinta", "Balsas", "Lerma"],
    ),
    (
        "Which Mexican state is the home of tequila?",
        "Jalisco",
        ["Oaxaca", "Sonora", "Chiapas"],
    ),
];

async fn run_seed(
    storage: &Storage,
    seed_file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let drafts: Vec<SeedQuestion> = match seed_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        }
        None => SAMPLE_QUESTIONS
            .iter()
            .map(|(prompt, answer, distractors)| SeedQuestion {
                prompt: (*prompt).to_string(),
                answer: (*answer).to_string(),
                distractors: distractors.iter().map(|d| (*d).to_string()).collect(),
            })
            .collect(),
    };

    if drafts.is_empty() {
        eprintln!("seed: no questions to import");
        return Ok(());
    }

    // Append after whatever is already there: new questions start a new chunk.
    let (mut next_id, start_chunk) = match storage.catalog.load_catalog().await {
        Ok(existing) => {
            let max_id = existing
                .questions()
                .iter()
                .map(|q| q.id().value())
                .max()
                .unwrap_or(0);
            (max_id + 1, existing.max_chunk() + 1)
        }
        Err(StorageError::Catalog(_)) => (1, 0),
        Err(err) => return Err(err.into()),
    };

    let mut imported = 0usize;
    for (index, draft) in drafts.into_iter().enumerate() {
        let chunk = start_chunk + u32::try_from(index / QUESTIONS_PER_CHUNK)?;
        let question = QuestionDraft {
            prompt: draft.prompt,
            answer: draft.answer,
            distractors: draft.distractors,
            chunk,
        }
        .validate(QuestionId::new(next_id))?;
        storage.catalog.upsert_question(&question).await?;
        next_id += 1;
        imported += 1;
    }

    println!(
        "Imported {imported} questions starting at chunk {start_chunk} ({QUESTIONS_PER_CHUNK} per chunk)."
    );
    Ok(())
}

async fn run_stats(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog_or_hint(storage).await?;
    let service = QuizService::new(catalog, Arc::clone(&storage.stats));

    let lines = service.stats_overview().await?;
    if lines.is_empty() {
        println!("No questions attempted yet.");
        return Ok(());
    }

    println!(
        "{:>6}  {:>8}  {:>7}  {:>6}  prompt",
        "id", "attempts", "correct", "weight"
    );
    for line in lines {
        println!(
            "{:>6}  {:>8}  {:>7}  {:>6.2}  {}",
            line.id, line.attempts, line.successes, line.weight, line.prompt
        );
    }
    Ok(())
}

async fn run_progress(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog_or_hint(storage).await?;
    let service = QuizService::new(catalog, Arc::clone(&storage.stats));

    let overview = service.progress_overview().await?;
    println!("{}", describe_unlocked(&overview));
    for chunk in &overview.chunks {
        println!(
            "  chunk {}: {} questions, {} confidently answered, {:.0}% average success",
            chunk.chunk + 1,
            chunk.total_questions,
            chunk.confident,
            chunk.average_success_rate * 100.0
        );
    }
    Ok(())
}

// Chunks are 0-indexed internally; people count positions from 1.
fn describe_unlocked(overview: &ProgressOverview) -> String {
    format!(
        "Chunk {} of {} unlocked ({} questions available).",
        overview.current_chunk + 1,
        overview.total_chunks,
        overview.unlocked_questions
    )
}

fn describe_new_unlock(overview: &ProgressOverview) -> String {
    format!(
        "New material unlocked: chunk {} of {}.",
        overview.current_chunk + 1,
        overview.total_chunks
    )
}

async fn run_reset(storage: &Storage, assume_yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !assume_yes {
        print!("This clears all answer history and progress. Type 'yes' to confirm: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        if line.trim().to_lowercase() != "yes" {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    storage.stats.reset().await?;
    println!("All progress reset. Questions are untouched.");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview(current_chunk: u32, total_chunks: u32, unlocked: usize) -> ProgressOverview {
        ProgressOverview {
            current_chunk,
            total_chunks,
            unlocked_questions: unlocked,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn single_chunk_catalog_reads_as_one_of_one() {
        assert_eq!(
            describe_unlocked(&overview(0, 1, 10)),
            "Chunk 1 of 1 unlocked (10 questions available)."
        );
    }

    #[test]
    fn unlock_message_counts_positions_from_one() {
        assert_eq!(
            describe_new_unlock(&overview(1, 2, 20)),
            "New material unlocked: chunk 2 of 2."
        );
    }
}
