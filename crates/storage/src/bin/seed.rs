use std::fmt;

use storage::fixtures::sample_questions;
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
}

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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("EXAM_DB_URL").unwrap_or_else(|_| "sqlite:exam.sqlite3?mode=rwc".into());

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = args.next().ok_or(ArgsError::MissingValue { flag: "--db" })?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Upserts the built-in sample questions into the question bank.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL (default: sqlite:exam.sqlite3?mode=rwc)");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;

    let drafts = sample_questions();
    for draft in &drafts {
        repo.upsert_question(draft).await?;
    }
    let total = repo.count_questions().await?;

    println!(
        "Seeded {} sample questions into {} ({} in bank)",
        drafts.len(),
        args.db_url,
        total
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
