mod config;
mod error;
mod tools;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use runtime::{
    Agent, AgentRuntime, AnthropicBackend, RunEvent, StreamingSession, SubAgentInvoker,
    ToolOutcome, ToolRegistry,
};
use storage::{Event, EventKind, EventStore, RunOutcome};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const SYSTEM_PROMPT: &str = "You are Tiller, a helpful assistant. Delegate focused sub-tasks \
to the available agents when that helps, and answer concisely.";
const CONFIG_FILE: &str = "tiller.toml";
const PRIMARY_AGENT: &str = "primary";

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "Run agents that delegate work to other agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the primary agent on a prompt (interactive when omitted)
    Run {
        /// The task for the primary agent
        prompt: Option<String>,
    },
    /// List recorded runs
    Runs {
        /// Show only the last N runs
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the event log of a run
    Logs {
        /// Run ID (prefix match supported)
        #[arg(short, long)]
        run: String,
        /// Filter by event kind (text_delta, tool_call_started, final_answer, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { prompt }) => cmd_run(&cli.config, prompt).await,
        None => cmd_run(&cli.config, None).await,
        Some(Commands::Runs { limit }) => cmd_runs(limit),
        Some(Commands::Logs { run, kind }) => cmd_logs(&run, kind.as_deref()),
    }
}

async fn cmd_run(config_path: &Path, prompt: Option<String>) -> Result<()> {
    let config = Config::load_or_default(config_path)?.with_env(|name| std::env::var(name).ok());

    let mut backend = AnthropicBackend::builder(config.api_key()?, &config.backend.model)
        .max_tokens(config.backend.max_tokens);
    if let Some(base_url) = &config.backend.base_url {
        backend = backend.base_url(base_url);
    }
    let backend = Arc::new(backend.build());

    let runtime = AgentRuntime::new(config.runtime.clone())?;
    let primary = build_primary(&config, backend)?;

    let data_dir = dirs_data_dir().unwrap_or_else(|| ".tiller".into());
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("events.db");
    let store = EventStore::open(&db_path)?;

    info!(db = %db_path.display(), agents = config.agents.len(), "tiller ready");

    if let Some(prompt) = prompt {
        return run_once(&runtime, &primary, &store, &prompt).await;
    }

    println!("tiller v{}", env!("CARGO_PKG_VERSION"));
    println!("Runs stored at: {}", db_path.display());
    println!("Model: {}", config.backend.model);
    println!("Ctrl+C cancels a run. Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        if let Err(e) = run_once(&runtime, &primary, &store, input).await {
            eprintln!("Error: {e}\n");
        }
    }

    Ok(())
}

/// The primary agent: built-in tools plus one delegate per `[[agents]]` entry.
fn build_primary(
    config: &Config,
    backend: Arc<AnthropicBackend>,
) -> Result<Arc<Agent<AnthropicBackend>>> {
    let mut registry = ToolRegistry::new();
    registry.register(tools::current_time())?;

    for sub in &config.agents {
        let mut sub_tools = ToolRegistry::new();
        sub_tools.register(tools::current_time())?;

        let mut builder = Agent::builder(&sub.name, Arc::clone(&backend)).tools(sub_tools);
        if let Some(description) = &sub.description {
            builder = builder.description(description);
        }
        if let Some(prompt) = &sub.system_prompt {
            builder = builder.system_prompt(prompt);
        }

        let invoker = SubAgentInvoker::new(Arc::new(builder.build()));
        if sub.parallel {
            registry.register(Arc::new(invoker.read_only()))?;
        } else {
            registry.register(Arc::new(invoker))?;
        }
    }

    let system_prompt = config.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT);
    Ok(Arc::new(
        Agent::builder(PRIMARY_AGENT, backend)
            .system_prompt(system_prompt)
            .tools(registry)
            .build(),
    ))
}

/// Stream one run to stdout and the event log. Ctrl-C cancels it.
async fn run_once(
    runtime: &AgentRuntime,
    agent: &Arc<Agent<AnthropicBackend>>,
    store: &EventStore,
    input: &str,
) -> Result<()> {
    let mut session = StreamingSession::start(runtime, Arc::clone(agent), input);
    let run_id = session.run_id();
    store.append(&Event::run_start(run_id, agent.name(), input))?;

    let cancel = session.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    while let Some(event) = session.next_event().await {
        store.append(&Event::new(run_id, EventKind::from(&event)))?;
        print_run_event(&event);
    }
    ctrl_c.abort();

    let usage = session.usage();
    store.append(&Event::new(
        run_id,
        EventKind::RunEnd {
            tokens_in: usage.tokens_in,
            tokens_out: usage.tokens_out,
            tool_calls: usage.tool_calls,
        },
    ))?;
    println!(
        "[run {run_id}: {} in / {} out tokens, {} tool calls]\n",
        usage.tokens_in, usage.tokens_out, usage.tool_calls
    );

    Ok(())
}

fn print_run_event(event: &RunEvent) {
    match event {
        RunEvent::TextDelta { text } => println!("{text}"),
        RunEvent::ToolCallStarted {
            tool_name, args, ..
        } => println!("  -> {tool_name} {args}"),
        RunEvent::ToolCallFinished { call_id, outcome } => match outcome {
            ToolOutcome::Success { .. } => println!("  <- {call_id} ok"),
            ToolOutcome::Failure { error } => {
                println!("  <- {call_id} failed ({}): {error}", error.kind())
            }
        },
        RunEvent::FinalAnswer { content } => println!("\n{content}\n"),
        RunEvent::Error { kind, message } => eprintln!("\nRun failed [{kind}]: {message}\n"),
    }
}

fn cmd_runs(limit: usize) -> Result<()> {
    let store = open_store()?;
    let runs = store.list_runs()?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<12}  {:<6}  OUTCOME",
        "RUN ID", "STARTED", "AGENT", "TOOLS"
    );
    println!("{}", "-".repeat(90));

    for summary in runs.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let outcome = match summary.outcome {
            RunOutcome::Answered => "answered",
            RunOutcome::Failed => "failed",
            RunOutcome::Unfinished => "unfinished",
        };
        println!(
            "{:<36}  {:<20}  {:<12}  {:<6}  {outcome}",
            summary.id,
            started,
            summary.agent.as_deref().unwrap_or("-"),
            summary.tool_calls
        );
    }

    Ok(())
}

fn cmd_logs(run_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;

    let runs = store.list_runs()?;
    let matching: Vec<_> = runs
        .iter()
        .filter(|r| r.id.to_string().starts_with(run_prefix))
        .collect();

    let run_id = match matching.as_slice() {
        [] => {
            return Err(Error::RunNotFound {
                prefix: run_prefix.to_string(),
            });
        }
        [only] => only.id,
        _ => {
            return Err(Error::AmbiguousRun {
                prefix: run_prefix.to_string(),
                matches: matching.iter().map(|r| r.id.to_string()).collect(),
            });
        }
    };

    let events = store.load_run(run_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for run {run_id}");
        return Ok(());
    }

    println!("Run: {run_id}\n");

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
        EventKind::RunStart { agent, input } => {
            println!("[{time}] === Run started ({agent}) ===");
            println!("[{time}] INPUT: {}", truncate(input));
        }
        EventKind::TextDelta { text } => println!("[{time}] TEXT: {}", truncate(text)),
        EventKind::ToolCallStarted {
            call_id,
            tool_name,
            args,
        } => println!("[{time}] TOOL CALL {call_id}: {tool_name} {args}"),
        EventKind::ToolCallFinished { call_id, outcome } => {
            println!("[{time}] TOOL RESULT {call_id}: {}", truncate(&outcome.to_string()))
        }
        EventKind::FinalAnswer { content } => println!("[{time}] ANSWER: {}", truncate(content)),
        EventKind::Error { kind, message } => println!("[{time}] ERROR [{kind}]: {message}"),
        EventKind::RunEnd {
            tokens_in,
            tokens_out,
            tool_calls,
        } => println!(
            "[{time}] === Run ended: {tokens_in} in / {tokens_out} out tokens, {tool_calls} tool calls ==="
        ),
    }
}

/// Shorten long content for display.
fn truncate(content: &str) -> String {
    const LIMIT: usize = 200;
    match content.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn open_store() -> Result<EventStore> {
    let data_dir = dirs_data_dir().unwrap_or_else(|| ".tiller".into());
    let db_path = data_dir.join("events.db");

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/tiller"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("tiller"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("tiller"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
