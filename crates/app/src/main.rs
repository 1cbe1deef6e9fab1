use std::fmt;
use std::path::PathBuf;

use marathon_core::model::{StageStatus, UserId};
use services::{
    Clock, LoadSource, MarathonSession, RemoteConfig, SaveOutcome, SessionIdentity, SyncConfig,
    remote_from_config,
};
use storage::sqlite::open_or_in_memory;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingStages,
    InvalidStage { raw: String },
    InvalidUser { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingStages => write!(f, "toggle requires at least one stage number"),
            ArgsError::InvalidStage { raw } => write!(f, "invalid stage number: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
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

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Toggle(Vec<u32>),
    Info,
}

struct Args {
    command: Command,
    db_url: String,
    user: Option<UserId>,
    remote_url: Option<String>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [status]            [options]");
    eprintln!("  cargo run -p app -- toggle <stage>...   [options]");
    eprintln!("  cargo run -p app -- info                [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>      Local progress database (default: sqlite://marathon.sqlite3)");
    eprintln!("  --user <id>            User id, overrides MARATHON_USER_ID");
    eprintln!("  --remote-url <url>     Remote progress endpoint, overrides MARATHON_REMOTE_URL");
    eprintln!("  -h, --help             Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MARATHON_DB_URL, MARATHON_USER_ID, MARATHON_FIRST_NAME, MARATHON_LAST_NAME,");
    eprintln!("  MARATHON_USERNAME, MARATHON_REMOTE_URL, MARATHON_REMOTE_TOKEN,");
    eprintln!("  MARATHON_REMOTE_TIMEOUT_MS, MARATHON_DEBOUNCE_MS, MARATHON_LOAD_BUDGET_MS, RUST_LOG");
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter().peekable();

        let command = match args.peek().map(String::as_str) {
            Some("status") => {
                args.next();
                Command::Status
            }
            Some("info") => {
                args.next();
                Command::Info
            }
            Some("toggle") => {
                args.next();
                let mut stages = Vec::new();
                while let Some(raw) = args.next_if(|arg| !arg.starts_with('-')) {
                    let stage = raw
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidStage { raw: raw.clone() })?;
                    stages.push(stage);
                }
                if stages.is_empty() {
                    return Err(ArgsError::MissingStages);
                }
                Command::Toggle(stages)
            }
            _ => Command::Status,
        };

        let mut db_url = normalize_sqlite_url(
            &std::env::var("MARATHON_DB_URL").unwrap_or_else(|_| "marathon.sqlite3".into()),
        );
        let mut user = None;
        let mut remote_url = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(&value);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    let parsed =
                        UserId::new(value.clone()).map_err(|_| ArgsError::InvalidUser { raw: value })?;
                    user = Some(parsed);
                }
                "--remote-url" => {
                    remote_url = Some(require_value(&mut args, "--remote-url")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            command,
            db_url,
            user,
            remote_url,
        })
    }
}

const MEMORY_URL: &str = "sqlite::memory:";

/// Turns `--db` input (a bare path, `sqlite:path` or `sqlite://path`) into an
/// absolute `sqlite://` URL.
fn normalize_sqlite_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw == MEMORY_URL || raw.starts_with("sqlite://") {
        return raw.to_string();
    }
    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    let absolute = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));
    format!("sqlite://{}", absolute.display())
}

/// Database file behind a `sqlite://` URL; `None` for an in-memory database.
fn sqlite_file_path(db_url: &str) -> Result<Option<PathBuf>, ArgsError> {
    if db_url == MEMORY_URL {
        return Ok(None);
    }
    let invalid = || ArgsError::InvalidDbUrl {
        raw: db_url.to_string(),
    };
    let rest = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() {
        return Err(invalid());
    }
    Ok(Some(PathBuf::from(path)))
}

/// Creates the database file and its directory so the first run can open it.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = sqlite_file_path(db_url)? else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok(())
}

fn status_marker(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Completed => "[x]",
        StageStatus::Available => "[ ]",
        StageStatus::Locked => "[-]",
    }
}

fn print_status(session: &MarathonSession) {
    let summary = session.summary();
    let source = match session.load_report().source {
        LoadSource::Remote => "remote",
        LoadSource::Local => "this device",
        LoadSource::Empty => "new",
    };
    println!(
        "{}: {}/{} stages ({}%), progress from {source}",
        session.identity().user_id(),
        summary.completed,
        summary.completed + summary.remaining,
        summary.percent,
    );
    for (stage, status) in session.statuses() {
        println!("  {} stage {:>2}", status_marker(status), stage.number());
    }
    if summary.is_complete {
        println!("Marathon complete.");
    }
}

fn print_save_outcome(outcome: Option<SaveOutcome>) {
    match outcome {
        Some(SaveOutcome::Sent) => println!("Progress synced."),
        Some(SaveOutcome::Failed(err)) => println!("Progress saved on this device only ({err})."),
        Some(SaveOutcome::Superseded) | None => {}
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let remote_config = match &args.remote_url {
        Some(url) => {
            let env_config = RemoteConfig::from_env()?;
            let mut config = RemoteConfig::new(url)?;
            if let Some(env_config) = env_config {
                config = config.with_timeout(env_config.timeout());
                if let Some(token) = env_config.bearer_token() {
                    config = config.with_bearer_token(token);
                }
            }
            Some(config)
        }
        None => RemoteConfig::from_env()?,
    };
    let sync_config = SyncConfig::from_env()?;

    let mut identity = SessionIdentity::from_env();
    if let Some(user) = args.user {
        identity = identity.with_user_id(user);
    }

    // A broken database path degrades to in-memory progress instead of aborting.
    if let Err(err) = prepare_sqlite_file(&args.db_url) {
        tracing::warn!(%err, db_url = %args.db_url, "could not prepare database file");
    }
    let local = open_or_in_memory(&args.db_url).await;
    let remote = remote_from_config(remote_config);

    let mut session = MarathonSession::bootstrap(
        identity,
        Clock::default_clock(),
        sync_config,
        local,
        remote,
    )
    .await;

    match args.command {
        Command::Status => print_status(&session),
        Command::Toggle(stages) => {
            for stage in stages {
                let report = session.toggle(stage).await?;
                let verb = if report.outcome.completed_now {
                    "completed"
                } else {
                    "reopened"
                };
                println!("Stage {} {verb}.", report.outcome.stage);
                if report.outcome.became_complete {
                    println!("All 21 stages walked. Congratulations!");
                }
            }
            print_save_outcome(session.flush().await);
            print_status(&session);
        }
        Command::Info => {
            let info = session.user_info().await?;
            println!("user:       {}", session.identity().user_id());
            println!("first name: {}", info.first_name.as_deref().unwrap_or("-"));
            println!("last name:  {}", info.last_name.as_deref().unwrap_or("-"));
            println!("username:   {}", info.username.as_deref().unwrap_or("-"));
            match info.registered_at {
                Some(at) => println!("registered: {}", at.to_rfc3339()),
                None => println!("registered: -"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("app=info,services=info,storage=info,marathon_core=info,sqlx=warn")
        }))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn defaults_to_status() {
        let args = Args::parse(argv(&["--user", "42"])).unwrap();
        assert_eq!(args.command, Command::Status);
        assert_eq!(args.user.unwrap().as_str(), "42");
    }

    #[test]
    fn toggle_collects_stage_numbers_before_flags() {
        let args = Args::parse(argv(&["toggle", "1", "2", "--remote-url", "http://x.test"])).unwrap();
        assert_eq!(args.command, Command::Toggle(vec![1, 2]));
        assert_eq!(args.remote_url.as_deref(), Some("http://x.test"));
    }

    #[test]
    fn toggle_without_stages_is_rejected() {
        assert!(matches!(
            Args::parse(argv(&["toggle"])),
            Err(ArgsError::MissingStages)
        ));
        assert!(matches!(
            Args::parse(argv(&["toggle", "two"])),
            Err(ArgsError::InvalidStage { .. })
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/progress.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/progress.sqlite3"));
        assert_eq!(normalize_sqlite_url(" sqlite::memory: "), MEMORY_URL);
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/m.sqlite3"),
            "sqlite:///tmp/m.sqlite3"
        );
    }

    #[test]
    fn file_path_ignores_query_and_memory_urls() {
        assert_eq!(
            sqlite_file_path("sqlite:///tmp/m.sqlite3?mode=rwc").unwrap(),
            Some(PathBuf::from("/tmp/m.sqlite3"))
        );
        assert_eq!(sqlite_file_path(MEMORY_URL).unwrap(), None);
        assert!(matches!(
            sqlite_file_path("postgres://db"),
            Err(ArgsError::InvalidDbUrl { .. })
        ));
        assert!(matches!(
            sqlite_file_path("sqlite://?mode=rwc"),
            Err(ArgsError::InvalidDbUrl { .. })
        ));
    }
}
