mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use consilience_core::types::Priority;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "consilience",
    about = "Consilience orchestration core: feed a conversation in, read prioritized interventions out",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .consilience/)
    #[arg(long, global = true, env = "CONSILIENCE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session over JSON-lines events read from stdin
    Run {
        /// Session identity
        #[arg(long)]
        session: String,

        /// Lane database (default: .consilience/lanes.redb)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep lanes in memory only
        #[arg(long, conflicts_with = "db")]
        memory: bool,
    },

    /// Show queued responses without removing them
    Lanes {
        /// Session identity (omit to list sessions with queued responses)
        #[arg(long)]
        session: Option<String>,

        /// Lane database (default: .consilience/lanes.redb)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Remove and print one lane, oldest first
    Drain {
        #[arg(long)]
        session: String,

        /// P0, P1, P2 or P3
        #[arg(long)]
        priority: Priority,

        /// Lane database (default: .consilience/lanes.redb)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Run {
            session,
            db,
            memory,
        } => cmd::run::run(&root, &session, db.as_deref(), memory, cli.json),
        Commands::Lanes { session, db } => {
            cmd::lanes::show(&root, session.as_deref(), db.as_deref(), cli.json)
        }
        Commands::Drain {
            session,
            priority,
            db,
        } => cmd::lanes::drain(&root, &session, priority, db.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
