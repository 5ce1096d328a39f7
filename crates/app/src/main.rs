use std::fmt;

use roadmap_core::model::{Module, ModuleId, SubDetailKey, Topic, TopicId};
use services::{Clock, ConfigError, EngineConfig, SessionEngine};
use storage::repository::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite://roadmap.sqlite3";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    InvalidModuleId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => write!(f, "{command} requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidModuleId { raw } => write!(f, "invalid --complete value: {raw}"),
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
    eprintln!("  cargo run -p app -- progress --topic <title> --modules <a,b,c> [--complete <id>]...");
    eprintln!("  cargo run -p app -- explore  --module <title> [--topic <title> --term <term>]");
    eprintln!("  cargo run -p app -- status   --topic <subject> [--offline]");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>   (default {DEFAULT_DB_URL})");
    eprintln!("  --api <base_url>    --token <bearer>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ROADMAP_DB_URL, ROADMAP_API_BASE_URL, ROADMAP_API_TOKEN,");
    eprintln!("  ROADMAP_POLL_SECS, ROADMAP_KV_QUOTA_BYTES, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Progress,
    Explore,
    Status,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "progress" => Some(Self::Progress),
            "explore" => Some(Self::Explore),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Explore => "explore",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: Option<String>,
    api_url: Option<String>,
    token: Option<String>,
    topic: Option<String>,
    modules: Vec<String>,
    complete: Vec<ModuleId>,
    module: Option<String>,
    term: Option<String>,
    offline: bool,
}

impl Args {
    fn parse(
        command: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--api" => parsed.api_url = Some(require_value(args, "--api")?),
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--topic" => parsed.topic = Some(require_value(args, "--topic")?),
                "--modules" => {
                    parsed.modules = require_value(args, "--modules")?
                        .split(',')
                        .map(str::trim)
                        .filter(|title| !title.is_empty())
                        .map(str::to_owned)
                        .collect();
                }
                "--complete" => {
                    let value = require_value(args, "--complete")?;
                    let id = value
                        .parse::<ModuleId>()
                        .map_err(|_| ArgsError::InvalidModuleId { raw: value.clone() })?;
                    parsed.complete.push(id);
                }
                "--module" => parsed.module = Some(require_value(args, "--module")?),
                "--term" => parsed.term = Some(require_value(args, "--term")?),
                "--offline" => parsed.offline = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        parsed.validate(command)?;
        Ok(parsed)
    }

    fn validate(&self, command: Command) -> Result<(), ArgsError> {
        let missing = |flag| ArgsError::MissingFlag {
            command: command.name(),
            flag,
        };
        match command {
            Command::Progress => {
                if self.topic.is_none() {
                    return Err(missing("--topic"));
                }
                if self.modules.is_empty() {
                    return Err(missing("--modules"));
                }
            }
            Command::Explore => {
                if self.module.is_none() {
                    return Err(missing("--module"));
                }
                if self.term.is_some() && self.topic.is_none() {
                    return Err(missing("--topic"));
                }
            }
            Command::Status => {
                if self.topic.is_none() {
                    return Err(missing("--topic"));
                }
            }
        }
        Ok(())
    }

    fn db_url(&self) -> String {
        self.db_url.clone().unwrap_or_else(|| {
            std::env::var("ROADMAP_DB_URL")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url)
        })
    }

    /// Environment first, flags override.
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        Ok(self.apply_api_flags(EngineConfig::from_env()?)?)
    }

    fn apply_api_flags(&self, mut config: EngineConfig) -> Result<EngineConfig, ConfigError> {
        if let Some(base_url) = &self.api_url {
            config.api = config.api.with_base_url(base_url.as_str())?;
        }
        if let Some(token) = &self.token {
            config.api = config.api.with_token(Some(token.clone()));
        }
        Ok(config)
    }

    fn topic(&self) -> Result<Topic, Box<dyn std::error::Error>> {
        let title = self.topic.clone().unwrap_or_default();
        let modules = self
            .modules
            .iter()
            .zip(1_u64..)
            .map(|(title, id)| Module::new(ModuleId::new(id), title.as_str(), ""))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Topic::new(TopicId::new(1), title, modules)?)
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

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let command = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let args = Args::parse(command, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config = args.engine_config()?;
    let db_url = args.db_url();
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url, config.kv_quota_bytes).await?;
    info!(db = %db_url, api = %config.api.base_url, command = command.name(), "engine ready");
    let engine = SessionEngine::from_config(&config, &storage, Clock::system())?;

    match command {
        Command::Progress => progress(&engine, &args).await,
        Command::Explore => explore(&engine, &args).await,
        Command::Status => status(&engine, &args).await,
    }
}

async fn progress(engine: &SessionEngine, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let topic = args.topic()?;
    let completion = engine.completion();
    let mut snapshot = completion.get_completion(&topic).await?;
    for module in &args.complete {
        snapshot = completion.mark_module_complete(&topic, *module).await?;
    }

    println!(
        "{}: {}% ({}/{} modules)",
        topic.title(),
        snapshot.percent,
        snapshot.completed_count(),
        snapshot.total_modules
    );
    for module in topic.modules() {
        let mark = if snapshot.completed_modules.contains(&module.id()) {
            "x"
        } else {
            " "
        };
        println!("  [{mark}] {} {}", module.id(), module.title());
    }
    Ok(())
}

async fn explore(engine: &SessionEngine, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let content = engine.content();
    let module = args.module.clone().unwrap_or_default();

    if let (Some(term), Some(topic)) = (&args.term, &args.topic) {
        let detail = content
            .sub_detail(SubDetailKey::new(term.as_str(), topic.as_str()))
            .await?;
        println!("{}", detail.html());
        return Ok(());
    }

    let sections = content.module_details(&module).await?;
    for section in sections.iter() {
        println!("## {}", section.title);
        for item in &section.items {
            println!("- {}: {}", item.term, item.definition);
        }
        println!();
    }
    Ok(())
}

async fn status(engine: &SessionEngine, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let subject = args.topic.clone().unwrap_or_default();
    let completion = engine.completion();
    let status = if args.offline {
        completion.quiz_status(&subject).await?
    } else {
        let api = engine.api();
        completion.sync_quiz_status(api.as_ref(), &subject).await?
    };

    let verdict = |passed: bool| if passed { "passed" } else { "not passed" };
    println!("{subject}");
    println!("  MCQ:         {}", verdict(status.mcq_passed));
    println!("  Descriptive: {}", verdict(status.descriptive_passed));
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
