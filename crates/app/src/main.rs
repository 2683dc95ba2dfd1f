use std::fmt;
use std::sync::Arc;

use exam_core::format;
use exam_core::model::{ExamConfig, Question};
use services::{
    Clock, ExamError, ExamSession, ExamSessionService, ExamSessionState, ExamStatus,
    review_items,
};
use storage::fixtures::StaticQuestionSet;
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_number<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- exam    [--db <sqlite_url>] [--questions <n>]");
    eprintln!("                              [--duration-secs <s>] [--pass <n>] [--sample]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--limit <n>]");
    eprintln!();
    eprintln!("Sample questions are seeded with `cargo run -p storage --bin seed`.");
    eprintln!();
    eprintln!("Defaults for exam:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --questions 33 --duration-secs 3600 --pass 17");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_QUESTIONS, EXAM_DURATION_SECS, EXAM_PASS_THRESHOLD, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exam,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "exam" => Some(Self::Exam),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    question_count: u32,
    duration_secs: u64,
    passing_threshold: u32,
    sample: bool,
    limit: u32,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("EXAM_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url),
            question_count: env_number("EXAM_QUESTIONS")
                .unwrap_or(ExamConfig::CITIZENSHIP_QUESTIONS),
            duration_secs: env_number("EXAM_DURATION_SECS")
                .unwrap_or(ExamConfig::CITIZENSHIP_DURATION_SECS),
            passing_threshold: env_number("EXAM_PASS_THRESHOLD")
                .unwrap_or(ExamConfig::CITIZENSHIP_PASSING_THRESHOLD),
            sample: false,
            limit: 10,
        };

        while let Some(arg) = args.next() {
            match (cmd, arg.as_str()) {
                (_, "--db") => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                (Command::Exam, "--questions") => {
                    parsed.question_count = parse_number(args, "--questions")?;
                }
                (Command::Exam, "--duration-secs") => {
                    parsed.duration_secs = parse_number(args, "--duration-secs")?;
                }
                (Command::Exam, "--pass") => {
                    parsed.passing_threshold = parse_number(args, "--pass")?;
                }
                (Command::Exam, "--sample") => parsed.sample = true,
                (Command::History, "--limit") => {
                    parsed.limit = parse_number(args, "--limit")?;
                }
                (_, "--help" | "-h") => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
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

//
// ─── TERMINAL EXAM ─────────────────────────────────────────────────────────────
//

enum Step {
    Continue,
    Quit,
}

fn print_question(state: &ExamSessionState, question: &Question) {
    println!();
    println!(
        "[{}] Question {}/{}  (answered {})",
        format::countdown(state.remaining_secs),
        state.current_index + 1,
        state.total_questions(),
        state.answered_count()
    );
    println!("{}", question.text());
    let selected = state.selected_for_current();
    for (i, answer) in question.answers().iter().enumerate() {
        let mark = if selected == Some(answer.id()) { "*" } else { " " };
        println!("  {mark} {}) {}", i + 1, answer.text());
    }
    println!(
        "Enter 1-{} to answer, n/p to move, s to submit, q to quit.",
        question.answers().len()
    );
}

async fn apply_input(
    session: &ExamSession,
    state: &ExamSessionState,
    input: &str,
) -> Result<Step, ExamError> {
    if let ExamStatus::ConfirmingSubmit {
        auto_triggered: false,
    } = state.status
    {
        if input.eq_ignore_ascii_case("y") {
            session.confirm_submit().await?;
        } else {
            session.cancel_submit().await?;
        }
        return Ok(Step::Continue);
    }

    match input {
        "n" => {
            session.navigate(1).await?;
        }
        "p" => {
            session.navigate(-1).await?;
        }
        "s" => {
            session.request_submit().await?;
        }
        "q" => return Ok(Step::Quit),
        other => {
            let answer = other
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| state.current_question()?.answers().get(i).map(|a| a.id()));
            match answer {
                Some(id) => {
                    session.select_current(id).await?;
                }
                None => println!("Unrecognised input: {other}"),
            }
        }
    }
    Ok(Step::Continue)
}

/// Drive a session from stdin until it is submitted or abandoned.
async fn run_terminal_exam(
    session: &ExamSession,
) -> Result<Option<ExamSessionState>, Box<dyn std::error::Error>> {
    let mut updates = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let state = session.current_state();
        match &state.status {
            ExamStatus::Loading => {
                updates.changed().await?;
                continue;
            }
            ExamStatus::LoadError(_) | ExamStatus::Submitted => return Ok(Some(state)),
            ExamStatus::ConfirmingSubmit {
                auto_triggered: true,
            } => {
                println!("Your time is up. The exam will be submitted now.");
                return Ok(Some(session.finished().await?));
            }
            ExamStatus::ConfirmingSubmit {
                auto_triggered: false,
            } => {
                println!(
                    "You've answered {} out of {} questions. Submit now? [y/N]",
                    state.answered_count(),
                    state.total_questions()
                );
            }
            ExamStatus::InProgress => {
                if let Some(question) = state.current_question() {
                    print_question(&state, question);
                }
            }
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(None);
                };
                match apply_input(session, &state, line.trim()).await {
                    Ok(Step::Continue) => {}
                    Ok(Step::Quit) => return Ok(None),
                    Err(err) => eprintln!("{err}"),
                }
            }
            deadline = updates.wait_for(|s| {
                matches!(
                    s.status,
                    ExamStatus::ConfirmingSubmit { auto_triggered: true } | ExamStatus::Submitted
                )
            }) => {
                deadline?;
            }
        }
    }
}

fn print_outcome(state: &ExamSessionState) {
    let Some(outcome) = &state.outcome else {
        return;
    };
    let result = &outcome.result;

    println!();
    println!("{}", if result.passed() { "PASSED" } else { "FAILED" });
    println!(
        "Score: {}/{} ({}%), {} needed to pass",
        result.correct_answers(),
        result.total_questions(),
        result.score_percent(),
        result.passing_threshold()
    );
    println!("Time spent: {}", format::time_spent(result.time_spent_secs()));

    for (i, item) in review_items(result, &state.questions).iter().enumerate() {
        let mark = if item.is_correct { "correct" } else { "wrong" };
        println!();
        println!("{}. {} [{mark}]", i + 1, item.question_text);
        println!("   Your answer:    {}", item.selected_answer);
        if !item.is_correct {
            println!("   Correct answer: {}", item.correct_answer);
        }
        if let Some(explanation) = &item.explanation {
            println!("   {explanation}");
        }
    }

    match (&outcome.store_error, outcome.result_id) {
        (Some(err), _) => eprintln!("warning: the result was not saved: {err}"),
        (None, Some(id)) => println!("\nSaved as result #{id}."),
        (None, None) => {}
    }
}

async fn exam(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let config = ExamConfig::new(args.question_count, args.duration_secs, args.passing_threshold)?;
    let service =
        ExamSessionService::from_storage(Clock::default_clock(), storage).with_config(config);

    let mut session = if args.sample {
        service.start_exam_from(Arc::new(StaticQuestionSet))?
    } else {
        service.start_exam()?
    };

    let mut finished = run_terminal_exam(&session).await?;
    let load_error = finished.as_ref().and_then(|s| match &s.status {
        ExamStatus::LoadError(err) => Some(err.clone()),
        _ => None,
    });
    if let Some(err) = load_error.filter(|_| !args.sample) {
        warn!(%err, "question bank unavailable, using sample questions");
        println!("Could not load questions ({err}). Starting with the sample set instead.");
        session = service.start_exam_from(Arc::new(StaticQuestionSet))?;
        finished = run_terminal_exam(&session).await?;
    }

    match finished {
        Some(state) => match &state.status {
            ExamStatus::LoadError(err) => {
                return Err(format!("no questions available: {err}").into());
            }
            _ => print_outcome(&state),
        },
        None => println!("Exam abandoned. Nothing was saved."),
    }
    Ok(())
}

async fn history(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let service = ExamSessionService::from_storage(Clock::default_clock(), storage);
    let rows = service.history(args.limit).await?;
    if rows.is_empty() {
        println!("No exam results yet.");
        return Ok(());
    }
    for row in rows {
        let result = &row.result;
        println!(
            "#{:<4} {}  {:>2}/{:<2} ({:>3}%)  {:>8}  {}",
            row.id,
            row.completed_at.format("%Y-%m-%d %H:%M"),
            result.correct_answers(),
            result.total_questions(),
            result.score_percent(),
            format::time_spent(result.time_spent_secs()),
            if result.passed() { "passed" } else { "failed" }
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: run an exam when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Exam,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Exam,
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
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite here so core/services stay storage agnostic.
    prepare_sqlite_file(&parsed.db_url)?;

    match cmd {
        Command::Exam => {
            let storage = Storage::sqlite(&parsed.db_url).await?;
            exam(&parsed, &storage).await
        }
        Command::History => {
            let storage = Storage::sqlite(&parsed.db_url).await?;
            history(&parsed, &storage).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
