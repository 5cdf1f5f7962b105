//! Thin CLI collaborator (§6): wires `ea-store` + `ea-providers` +
//! `ea-tools` + `ea-engine` together behind the subcommands the spec's
//! external CLI contract names. It owns no agent behaviour itself — see
//! `commands.rs`.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::OutputFormat;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "ea-agent", version, about = "Event-sourced conversational agent runtime")]
struct Cli {
    /// Stream category prefix (e.g. "agent").
    #[arg(long, global = true, default_value = "agent")]
    category: String,

    /// Stream name version segment (e.g. "v0").
    #[arg(long, global = true)]
    version: Option<String>,

    /// Path to a TOML config file (defaults to $EA_CONFIG or ./config.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a brand new session with an initial user message.
    Start { message: String },
    /// Re-enter the processing loop on an existing thread without adding a
    /// new user turn.
    Continue { thread_id: String },
    /// Add a user turn to an existing thread and drive it to termination.
    Message { thread_id: String, text: String },
    /// Show a thread's projected session state (and, with --full, its events).
    Show {
        thread_id: String,
        #[arg(long, default_value = "text")]
        format: String,
        #[arg(long)]
        full: bool,
    },
    /// List known threads, most recently active first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ea_engine=debug")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app_config = AppConfig::load(cli.config.as_deref(), &cli.category, cli.version.as_deref())?;

    match cli.command {
        Command::Start { message } => commands::start(&app_config, &message).await,
        Command::Continue { thread_id } => commands::continue_thread(&app_config, &thread_id).await,
        Command::Message { thread_id, text } => commands::message(&app_config, &thread_id, &text).await,
        Command::Show { thread_id, format, full } => {
            let format = OutputFormat::parse(&format)?;
            commands::show(&app_config, &thread_id, format, full).await
        }
        Command::List { limit, format } => {
            let format = OutputFormat::parse(&format)?;
            commands::list(&app_config, limit, format).await
        }
    }
}
