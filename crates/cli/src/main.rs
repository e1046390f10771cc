mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, TimeZone};
use clap::{Args, Parser, Subcommand};
use storage::{Event, EventKind, EventStore};
use toolchain::{
    AnyBackend, GenAiBackend, OpenAiBackend, OpenAiEmbedder, SemanticToolSelector, Toolchain,
    VertexAiBackend, VertexAuth,
};
use tools::{ToolContext, builtin};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::{BackendConfig, Config, EmbedderKind, Provider, SelectorConfig};
use error::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Call a tool whenever it gives a better answer than guessing, and answer concisely.";
const DEFAULT_PROMPT: &str = "What's the weather in New York City?";
const NEXT_PROMPT: &str = "\nEnter another prompt (or press Enter to quit): ";

#[derive(Parser)]
#[command(name = "llm-toolchain")]
#[command(about = "Chat with an LLM that can call local tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./llm-toolchain.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Do not load environment variables from .env
    #[arg(long, global = true)]
    no_dotenv: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Chat(ChatArgs),
    /// List the built-in tools
    Tools,
    /// Show which tools the selector would offer for a prompt
    Select {
        /// Prompt to score the tools against
        prompt: String,
    },
    /// List recorded sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show event logs for a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (prompt, tool_call, tool_result, response, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[derive(Args, Default)]
struct ChatArgs {
    /// Provider to use (overrides the config file)
    #[arg(long, value_enum)]
    provider: Option<Provider>,

    /// Model to use (overrides the config file)
    #[arg(short, long)]
    model: Option<String>,

    /// First prompt to send
    #[arg(short, long)]
    prompt: Option<String>,

    /// Do not record the session to the event log
    #[arg(long)]
    no_log: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.no_dotenv {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Warning: failed to load .env: {e}");
            }
        }
    }
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Chat(args)) => cmd_chat(&config, args).await,
        None => cmd_chat(&config, ChatArgs::default()).await,
        Some(Commands::Tools) => cmd_tools(),
        Some(Commands::Select { prompt }) => cmd_select(&config, &prompt).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&session, kind.as_deref()),
    }
}

async fn cmd_chat(config: &Config, args: ChatArgs) -> Result<()> {
    println!("llm-toolchain v{}", toolchain::VERSION);

    let provider = args.provider.unwrap_or(config.backend.provider);
    let backend = build_backend(provider, args.model.as_deref(), &config.backend)?;
    println!("Backend: {backend}");

    let cwd = std::env::current_dir()?;
    let settings = &config.toolchain;
    let mut builder = Toolchain::builder(backend)
        .policy(config.policy(&cwd))
        .context(ToolContext::new(&cwd))
        .system(settings.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT))
        .max_iterations(settings.max_iterations)
        .tool_timeout(Duration::from_secs(settings.tool_timeout_secs))
        .keep_history(settings.keep_history);

    builder = if config.selector.enabled {
        builder.selector(build_selector(&config.selector)?)
    } else {
        builder.tools(builtin::all())
    };

    if !args.no_log {
        let data_dir = dirs_data_dir().unwrap_or_else(|| ".llm-toolchain".into());
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("events.db");
        builder = builder.recorder(EventStore::open(&db_path)?);
        println!("Session stored at: {}", db_path.display());
    }

    let mut chain = builder.build()?;
    if let Some(id) = chain.session_id() {
        println!("Session ID: {id}");
    }

    let mut next = first_prompt(args.prompt);
    while let Some(prompt) = next {
        println!("\n-> User Prompt: {prompt}\n");
        match chain.run(&prompt).await {
            Ok(response) => println!("<- LLM Response: {response}"),
            Err(e) => println!("An error occurred while running the toolchain: {e}"),
        }

        next = read_prompt(NEXT_PROMPT)?;
    }

    chain.end();
    println!("\nSession ended.");
    Ok(())
}

/// The opening prompt. A blank `--prompt` means there is nothing to ask.
fn first_prompt(arg: Option<String>) -> Option<String> {
    match arg {
        None => Some(DEFAULT_PROMPT.to_string()),
        Some(p) if p.trim().is_empty() => None,
        Some(p) => Some(p),
    }
}

/// Read one line; `None` on EOF or an empty line.
fn read_prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

fn require_env(var: &'static str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(Error::MissingEnv { var })
}

fn build_backend(
    provider: Provider,
    model: Option<&str>,
    config: &BackendConfig,
) -> Result<AnyBackend> {
    let model = model.or(config.model.as_deref());

    let backend = match provider {
        Provider::OpenAi => {
            let mut builder = OpenAiBackend::builder(require_env("OPENAI_API_KEY")?);
            if let Some(model) = model {
                builder = builder.model(model);
            }
            if let Some(url) = &config.base_url {
                builder = builder.base_url(url);
            }
            if let Some(max_tokens) = config.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
            if let Some(temperature) = config.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().into()
        }
        Provider::Gemini => {
            let mut builder = GenAiBackend::builder(require_env("GEMINI_API_KEY")?);
            if let Some(model) = model {
                builder = builder.model(model);
            }
            if let Some(url) = &config.base_url {
                builder = builder.base_url(url);
            }
            if let Some(max_tokens) = config.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
            if let Some(temperature) = config.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().into()
        }
        Provider::Vertex => {
            let project_id = match require_env("GEMINI_PROJECT_ID") {
                Ok(id) => id,
                Err(e) => config.project_id.clone().ok_or(e)?,
            };
            let mut builder = VertexAiBackend::builder(project_id);
            if let Ok(token) = require_env("VERTEX_ACCESS_TOKEN") {
                builder = builder.auth(VertexAuth::AccessToken(token));
            }
            if let Some(location) = &config.location {
                builder = builder.location(location);
            }
            if let Some(model) = model {
                builder = builder.model(model);
            }
            if let Some(url) = &config.base_url {
                builder = builder.base_url(url);
            }
            if let Some(max_tokens) = config.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
            if let Some(temperature) = config.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build()?.into()
        }
    };
    Ok(backend)
}

fn build_selector(config: &SelectorConfig) -> Result<SemanticToolSelector> {
    // Fail early on misspelled tool names.
    builtin::by_names(&config.always_include)?;

    let selector = SemanticToolSelector::new(builtin::all())
        .top_k(config.top_k)
        .min_score(config.min_score)
        .always_include(config.always_include.iter().cloned());

    Ok(match config.embedder {
        EmbedderKind::Lexical => selector,
        EmbedderKind::OpenAi => {
            let mut embedder = OpenAiEmbedder::new(require_env("OPENAI_API_KEY")?);
            if let Some(model) = &config.embedding_model {
                embedder = embedder.with_model(model);
            }
            selector.with_embedder(embedder)
        }
    })
}

fn cmd_tools() -> Result<()> {
    let tools = builtin::all();
    let width = tools.iter().map(|t| t.name().len()).max().unwrap_or(0);

    println!("{:<width$}  DESCRIPTION", "TOOL");
    println!("{}", "-".repeat(80));
    for tool in tools {
        println!("{:<width$}  {}", tool.name(), tool.description());
    }
    Ok(())
}

async fn cmd_select(config: &Config, prompt: &str) -> Result<()> {
    let selector = build_selector(&config.selector)?;
    let ranked = selector.rank(prompt).await?;
    let chosen: Vec<String> = selector
        .select(prompt)
        .await?
        .iter()
        .map(|t| t.name().to_string())
        .collect();

    println!("{:<3} {:<24}  SCORE", "", "TOOL");
    println!("{}", "-".repeat(40));
    for scored in ranked {
        let mark = if chosen.contains(&scored.name) { "*" } else { "" };
        println!("{mark:<3} {:<24}  {:.3}", scored.name, scored.score);
    }
    println!("\nSelected: {}", chosen.join(", "));
    Ok(())
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<28}  {:<7}  STATUS",
        "SESSION ID", "STARTED", "MODEL", "PROMPTS"
    );
    println!("{}", "-".repeat(104));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let model = format!("{}/{}", summary.provider, summary.model);
        let status = if summary.ended_at.is_some() {
            "ended"
        } else {
            "open"
        };
        println!(
            "{:<36}  {:<16}  {:<28}  {:<7}  {status}",
            summary.id,
            started.to_string(),
            model,
            summary.prompt_count
        );
    }

    Ok(())
}

fn cmd_logs(session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let session_id = store.find_session(session_prefix)?;
    let events = store.load_session(session_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");
    for event in events {
        print_event(&event);
    }
    Ok(())
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart { provider, model } => {
            println!("[{time}] === Session started ({provider}/{model}) ===");
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Prompt { text } => {
            println!("[{time}] PROMPT: {}", truncate(text, 200));
        }
        EventKind::ToolsSelected { names } => {
            println!("[{time}] TOOLS OFFERED: {}", names.join(", "));
        }
        EventKind::ToolCall { name, input } => {
            println!("[{time}] TOOL CALL: {name} {input}");
        }
        EventKind::ToolResult {
            name,
            output,
            is_error,
        } => {
            let label = if *is_error { "TOOL ERROR" } else { "TOOL RESULT" };
            println!("[{time}] {label}: {name} {}", truncate(&output.to_string(), 200));
        }
        EventKind::Response {
            text,
            input_tokens,
            output_tokens,
        } => {
            println!(
                "[{time}] RESPONSE ({input_tokens} in / {output_tokens} out): {}",
                truncate(text, 200)
            );
        }
        EventKind::RunFailed { message } => {
            println!("[{time}] FAILED: {message}");
        }
    }
}

/// Shorten `text` to `max` characters for display.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn open_store() -> Result<EventStore> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".llm-toolchain".into());
    let db_path = data_dir.join("events.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("LLM_TOOLCHAIN_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| Path::new(&h).join(".local/share/llm-toolchain"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".local/share")))
            .map(|p| p.join("llm-toolchain"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| Path::new(&h).join("llm-toolchain"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
