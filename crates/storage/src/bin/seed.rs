use std::fmt;

use chrono::{DateTime, Utc};
use marathon_core::model::{ProgressState, Stage, UserId};
use storage::repository::LocalStore;
use storage::sqlite::SqliteLocalStore;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user: UserId,
    stages: Vec<Stage>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUser { raw: String },
    InvalidStages { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidStages { raw } => write!(f, "invalid --stages value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
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

fn parse_stages(raw: &str) -> Result<Vec<Stage>, ArgsError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .ok()
                .and_then(|n| Stage::new(n).ok())
                .ok_or_else(|| ArgsError::InvalidStages {
                    raw: raw.to_string(),
                })
        })
        .collect()
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("MARATHON_DB_URL").unwrap_or_else(|_| "sqlite:marathon.sqlite3?mode=rwc".into());
        let mut user = std::env::var("MARATHON_USER_ID").unwrap_or_else(|_| "demo_user".into());
        let mut stages = Vec::new();
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => {
                    user = require_value(&mut args, "--user")?;
                }
                "--stages" => {
                    let value = require_value(&mut args, "--stages")?;
                    stages = parse_stages(&value)?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let user = UserId::new(user.clone()).map_err(|_| ArgsError::InvalidUser { raw: user })?;

        Ok(Self {
            db_url,
            user,
            stages,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:marathon.sqlite3?mode=rwc)");
    eprintln!("  --user <id>               User whose progress is replaced (default: demo_user)");
    eprintln!("  --stages <list>           Comma separated completed stages, e.g. 1,2,3");
    eprintln!("  --now <rfc3339>           Fixed timestamp for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  MARATHON_DB_URL, MARATHON_USER_ID");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let store = SqliteLocalStore::open(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);
    let state = ProgressState::from_stages(args.stages.iter().copied(), now);
    store.write(&args.user, &state).await?;

    eprintln!(
        "seeded {} completed stage(s) for {} in {}",
        state.completed_count(),
        args.user,
        args.db_url
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
