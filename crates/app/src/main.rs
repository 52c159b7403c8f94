use std::fmt;
use std::io::{self, BufRead, Write};

use services::{
    EndReason, StepAnnouncer, WalkthroughConfig, WalkthroughController, WalkthroughError,
};
use tracing_subscriber::EnvFilter;
use walkthrough_core::model::{ComponentId, CurrentStep, TourKey, UiStateBag};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSteps { raw: String },
    InvalidDbUrl { raw: String },
    InvalidTour { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSteps { raw } => write!(f, "invalid --steps value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTour { raw } => write!(f, "invalid --tour value: {raw:?}"),
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
    eprintln!("  walkthrough [--db <sqlite_url>] [--tour <key>] [--steps <n>]");
    eprintln!();
    eprintln!("Reads one command per line from stdin:");
    eprintln!("  status | start [n] | next | prev | jump <i> | pause | unpause");
    eprintln!("  finish | cancel | offer | resume | restart | dismiss");
    eprintln!("  ui-get <id> | ui-set <id> <key>=<json>... | ui-clear <id> | ui-reset");
    eprintln!("  quit");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:walkthrough.sqlite3");
    eprintln!("  --tour main");
    eprintln!("  --steps 5");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WALKTHROUGH_DB_URL, WALKTHROUGH_TOUR, WALKTHROUGH_STEPS, RUST_LOG");
}

struct Args {
    db_url: String,
    tour: TourKey,
    steps: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("WALKTHROUGH_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("walkthrough.sqlite3".into()), normalize_sqlite_url);
        let mut tour = std::env::var("WALKTHROUGH_TOUR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| TourKey::new("main"), TourKey::new);
        let mut steps = std::env::var("WALKTHROUGH_STEPS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(5);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--tour" => {
                    let value = require_value(args, "--tour")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidTour { raw: value });
                    }
                    tour = TourKey::new(value.trim());
                }
                "--steps" => {
                    let value = require_value(args, "--steps")?;
                    steps = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSteps { raw: value.clone() })?;
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
            tour,
            steps,
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

#[derive(Debug)]
enum CommandError {
    Usage(&'static str),
    Walkthrough(WalkthroughError),
    Json(serde_json::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Usage(usage) => write!(f, "usage: {usage}"),
            CommandError::Walkthrough(err) => write!(f, "{err}"),
            CommandError::Json(err) => write!(f, "invalid json: {err}"),
        }
    }
}

impl From<WalkthroughError> for CommandError {
    fn from(err: WalkthroughError) -> Self {
        Self::Walkthrough(err)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

enum Flow {
    Continue,
    Quit,
}

fn print_step(step: &CurrentStep) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string(step)?);
    Ok(())
}

fn parse_fields<'a>(pairs: impl Iterator<Item = &'a str>) -> Result<UiStateBag, CommandError> {
    let mut bag = UiStateBag::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or(CommandError::Usage("ui-set <id> <key>=<json>..."))?;
        // Bare words are taken as strings so `mode=compact` works without quotes.
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        bag = bag.with(key, value);
    }
    Ok(bag)
}

fn run_command(
    controller: &mut WalkthroughController,
    default_steps: u32,
    line: &str,
) -> Result<Flow, CommandError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Flow::Continue);
    };

    match command {
        "status" => print_step(&controller.current_step())?,
        "start" => {
            let steps = match words.next() {
                Some(raw) => raw.parse().map_err(|_| CommandError::Usage("start [n]"))?,
                None => default_steps,
            };
            print_step(&controller.start_tour(steps)?)?;
        }
        "next" => print_step(&controller.next_step()?)?,
        "prev" => print_step(&controller.previous_step()?)?,
        "jump" => {
            let index = words
                .next()
                .and_then(|raw| raw.parse().ok())
                .ok_or(CommandError::Usage("jump <i>"))?;
            print_step(&controller.go_to_step(index)?)?;
        }
        "pause" => print_step(&controller.pause_tour()?)?,
        "unpause" => print_step(&controller.resume_tour()?)?,
        "finish" => print_step(&controller.end_tour(EndReason::Finished)?)?,
        "cancel" => print_step(&controller.end_tour(EndReason::Cancelled)?)?,
        "offer" => println!("{}", serde_json::to_string(&controller.resume_offer())?),
        "resume" => print_step(&controller.resume()?)?,
        "restart" => print_step(&controller.restart()?)?,
        "dismiss" => {
            controller.dismiss()?;
            print_step(&controller.current_step())?;
        }
        "ui-get" => {
            let id = words.next().ok_or(CommandError::Usage("ui-get <id>"))?;
            let bag = controller.ui_state(&ComponentId::new(id));
            println!("{}", serde_json::to_string(&bag)?);
        }
        "ui-set" => {
            let id = words
                .next()
                .ok_or(CommandError::Usage("ui-set <id> <key>=<json>..."))?;
            let partial = parse_fields(words)?;
            controller.set_ui_state(id, partial);
            let bag = controller.ui_state(&ComponentId::new(id));
            println!("{}", serde_json::to_string(&bag)?);
        }
        "ui-clear" => {
            let id = words.next().ok_or(CommandError::Usage("ui-clear <id>"))?;
            controller.clear_component(id);
        }
        "ui-reset" => controller.reset_ui_state(),
        "quit" | "exit" => return Ok(Flow::Quit),
        _ => return Err(CommandError::Usage("see --help for commands")),
    }

    Ok(Flow::Continue)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    tracing::info!(db = %parsed.db_url, tour = %parsed.tour, "opening walkthrough");
    let config = WalkthroughConfig::new(parsed.tour.clone());
    let mut controller = WalkthroughController::open_sqlite(&parsed.db_url, config).await?;

    // Stand-in for the accessibility read-out: it only observes step changes.
    let announcer = StepAnnouncer::new(|step: &CurrentStep| {
        if step.active {
            eprintln!("» step {} of {}", step.index + 1, step.total);
        } else {
            eprintln!("» tour ended");
        }
    });
    let _announcements = controller.subscribe(move |batch| announcer.observe(batch));

    if let Some(offer) = controller.resume_offer() {
        eprintln!(
            "Tour {:?} was interrupted at step {} of {} ({}% done, {}s ago). resume / restart / dismiss?",
            parsed.tour.as_str(),
            offer.step_index + 1,
            offer.total_steps,
            offer.percent_complete,
            offer.elapsed_seconds
        );
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match run_command(&mut controller, parsed.steps, line.trim()) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => eprintln!("error: {err}"),
        }
        io::stdout().flush()?;
    }

    controller.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
